use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use data_encoding::BASE32_NOPAD;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use vaultkeep::model::{
    ItemPayload, NoteFormat, OtpAlgorithm, OtpCode, OtpKind, OtpSecret, SecretFormat, SecureNote,
    VaultItem, VaultItemTag,
};
use vaultkeep::{
    BackupPasswordExport, Config, DerivedEncryptionKey, ImportPolicy, KdfProfile,
    KeyDeriverRegistry, Storage, Vault, default_storage, format,
};
use zeroize::Zeroizing;

mod auth;

#[derive(Debug, Parser)]
#[command(name = "vaultkeep")]
#[command(version, about = "Offline OTP and secure-note vault with encrypted backups.")]
struct Cli {
    /// Path to the local vault file
    #[arg(long, global = true, value_name = "PATH", env = "VAULTKEEP_PATH")]
    store: Option<PathBuf>,

    /// Key derivation profile for newly written files
    #[arg(long, global = true, value_enum, env = "VAULTKEEP_KDF_PROFILE")]
    kdf_profile: Option<KdfProfile>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    Sha1,
    Sha256,
    Sha512,
}

impl From<AlgorithmArg> for OtpAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Sha1 => OtpAlgorithm::Sha1,
            AlgorithmArg::Sha256 => OtpAlgorithm::Sha256,
            AlgorithmArg::Sha512 => OtpAlgorithm::Sha512,
        }
    }
}

#[derive(Debug, clap::Args)]
struct OtpArgs {
    /// Service name, e.g. "GitHub"
    #[arg(long, default_value = "")]
    issuer: String,

    /// Account name, e.g. an email address
    #[arg(long, default_value = "")]
    account: String,

    /// Shared secret, base32 as shown by most providers
    secret: String,

    #[arg(long, value_enum, default_value = "sha1")]
    algorithm: AlgorithmArg,

    #[arg(long, default_value_t = 6)]
    digits: u16,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Creates a new empty vault
    Init,

    /// Adds a time-based one-time password
    #[command(arg_required_else_help = true)]
    AddTotp {
        #[command(flatten)]
        otp: OtpArgs,
        /// Code lifetime in seconds
        #[arg(long, default_value_t = 30)]
        period: u64,
    },

    /// Adds a counter-based one-time password
    #[command(arg_required_else_help = true)]
    AddHotp {
        #[command(flatten)]
        otp: OtpArgs,
        #[arg(long, default_value_t = 0)]
        counter: u64,
    },

    /// Adds a secure note
    #[command(arg_required_else_help = true)]
    AddNote {
        title: String,
        contents: String,
        /// Render contents as markdown
        #[arg(long)]
        markdown: bool,
        /// Tag ids to attach
        #[arg(long = "tag")]
        tags: Vec<Uuid>,
    },

    /// Creates a tag
    #[command(arg_required_else_help = true)]
    AddTag { name: String },

    /// Lists items and tags
    List,

    /// Removes an item by id
    #[command(arg_required_else_help = true)]
    Remove { id: Uuid },

    /// Writes an encrypted backup of the whole vault
    Export {
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
        /// Free-form note stored inside the backup
        #[arg(long, default_value = "")]
        description: String,
        /// Seal with a saved backup key instead of a password
        #[arg(long, value_name = "FILE")]
        key_file: Option<PathBuf>,
    },

    /// Restores items from an encrypted backup
    #[command(arg_required_else_help = true)]
    Import {
        file: PathBuf,
        /// Replace the vault contents instead of merging
        #[arg(long = "override")]
        replace: bool,
        #[arg(long, value_name = "FILE")]
        key_file: Option<PathBuf>,
    },

    /// Derives a backup key once and saves it for password-less exports
    BackupPassword {
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },

    /// Shows a backup's header without decrypting it
    #[command(arg_required_else_help = true)]
    Inspect { file: PathBuf },
}

fn resolve_storage(path: Option<PathBuf>) -> Result<Storage> {
    match path {
        Some(p) => Ok(Storage::new(p)),
        None => default_storage(),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn open_vault(
    store: Option<PathBuf>,
    config: Config,
    token: CancellationToken,
) -> Result<Vault> {
    let storage = resolve_storage(store)?;
    let password = auth::read_password()?;
    Vault::open(Zeroizing::new(password.as_bytes().to_vec()), storage, config, token).await
}

fn decode_base32_secret(secret: &str) -> Result<Zeroizing<Vec<u8>>> {
    let normalized: Zeroizing<String> = Zeroizing::new(
        secret
            .chars()
            .filter(|ch| !ch.is_ascii_whitespace() && *ch != '=')
            .map(|ch| ch.to_ascii_uppercase())
            .collect(),
    );
    let data = BASE32_NOPAD
        .decode(normalized.as_bytes())
        .context("secret is not valid base32")?;
    if data.is_empty() {
        bail!("secret cannot be empty");
    }
    Ok(Zeroizing::new(data))
}

fn otp_item(otp: OtpArgs, kind: OtpKind) -> Result<VaultItem> {
    if otp.issuer.is_empty() && otp.account.is_empty() {
        bail!("give at least one of --issuer or --account");
    }
    Ok(VaultItem::new(ItemPayload::Otp(OtpCode {
        kind,
        secret: OtpSecret {
            format: SecretFormat::Base32,
            data: decode_base32_secret(&otp.secret)?,
        },
        algorithm: otp.algorithm.into(),
        digits: otp.digits,
        issuer: otp.issuer,
        account_name: otp.account,
    })))
}

fn load_key_file(path: &Path) -> Result<DerivedEncryptionKey> {
    let json = Zeroizing::new(
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read key file {}", path.display()))?,
    );
    Ok(BackupPasswordExport::from_json(&json)?.into_key()?)
}

fn backup_password(confirm: bool) -> Result<Zeroizing<Vec<u8>>> {
    let pw = auth::read_backup_password(confirm)?;
    Ok(Zeroizing::new(pw.as_bytes().to_vec()))
}

async fn run(cli: Cli, token: CancellationToken) -> Result<()> {
    let config = cli.kdf_profile.map(Config::with_profile).unwrap_or_default();
    debug!(?config, "configuration resolved");

    match cli.command {
        Commands::Init => {
            let storage = resolve_storage(cli.store)?;
            let password = auth::read_new_password()?;
            Vault::init(
                Zeroizing::new(password.as_bytes().to_vec()),
                storage,
                config,
                token,
            )
            .await?;
            println!("vault initialized");
        }
        Commands::AddTotp { otp, period } => {
            let mut vault = open_vault(cli.store, config, token.clone()).await?;
            let item = otp_item(otp, OtpKind::Totp { period })?;
            let id = item.id;
            vault.store_mut().add_item(item)?;
            vault.save()?;
            println!("{id}");
        }
        Commands::AddHotp { otp, counter } => {
            let mut vault = open_vault(cli.store, config, token.clone()).await?;
            let item = otp_item(otp, OtpKind::Hotp { counter })?;
            let id = item.id;
            vault.store_mut().add_item(item)?;
            vault.save()?;
            println!("{id}");
        }
        Commands::AddNote {
            title,
            contents,
            markdown,
            tags,
        } => {
            let mut vault = open_vault(cli.store, config, token.clone()).await?;
            let mut item = VaultItem::new(ItemPayload::Note(SecureNote {
                title,
                contents,
                format: if markdown {
                    NoteFormat::Markdown
                } else {
                    NoteFormat::Plain
                },
            }));
            item.metadata.tags.extend(tags);
            let id = item.id;
            vault.store_mut().add_item(item)?;
            vault.save()?;
            println!("{id}");
        }
        Commands::AddTag { name } => {
            let mut vault = open_vault(cli.store, config, token.clone()).await?;
            let tag = VaultItemTag::new(name);
            let id = tag.id;
            vault.store_mut().add_tag(tag);
            vault.save()?;
            println!("{id}");
        }
        Commands::List => {
            let vault = open_vault(cli.store, config, token.clone()).await?;
            let store = vault.store();

            if store.is_empty() && store.tags().is_empty() {
                println!("Vault is empty.");
                return Ok(());
            }

            for item in store.items() {
                println!(
                    "{}  {:<4}  {}  {}",
                    item.id,
                    item.kind(),
                    item.updated.format("%Y-%m-%d %H:%M"),
                    item.title()
                );
            }
            for tag in store.tags() {
                println!("{}  tag   {}", tag.id, tag.name);
            }
        }
        Commands::Remove { id } => {
            let mut vault = open_vault(cli.store, config, token.clone()).await?;
            vault.store_mut().remove_item(&id)?;
            vault.save()?;
            println!("item '{id}' removed");
        }
        Commands::Export {
            out,
            description,
            key_file,
        } => {
            let vault = open_vault(cli.store, config, token.clone()).await?;
            let backup = match key_file {
                Some(path) => vault.export_backup_with_key(&load_key_file(&path)?, &description)?,
                None => {
                    vault
                        .export_backup(backup_password(true)?, &description, token)
                        .await?
                }
            };
            Storage::new(&out).save(&format::serialize(&backup)?)?;
            println!(
                "exported {} items to {}",
                vault.store().len(),
                out.display()
            );
        }
        Commands::Import {
            file,
            replace,
            key_file,
        } => {
            let mut vault = open_vault(cli.store, config, token.clone()).await?;
            let backup = format::parse(&Storage::new(&file).load()?)
                .with_context(|| format!("{} is not a vaultkeep backup", file.display()))?;
            let policy = if replace {
                ImportPolicy::Override
            } else {
                ImportPolicy::Merge
            };

            let summary = match key_file {
                Some(path) => vault.import_backup_with_key(&backup, &load_key_file(&path)?, policy)?,
                None => {
                    vault
                        .import_backup(&backup, backup_password(false)?, policy, token)
                        .await?
                }
            };
            vault.save()?;
            println!(
                "imported {} items ({} kept local), {} tags",
                summary.items_written, summary.items_skipped, summary.tags_written
            );
        }
        Commands::BackupPassword { out } => {
            let vault = open_vault(cli.store, config, token.clone()).await?;
            let key = vault
                .derive_backup_key(backup_password(true)?, token)
                .await?;
            let record = Zeroizing::new(BackupPasswordExport::from_key(&key).to_json()?);
            Storage::new(&out).save(record.as_bytes())?;
            println!("backup key written to {}", out.display());
        }
        Commands::Inspect { file } => {
            let backup = format::parse(&Storage::new(&file).load()?)?;
            let registry = KeyDeriverRegistry::standard();
            let known = registry.lookup(backup.signature()).is_ok();

            println!("version:   {}", backup.version());
            println!("created:   {}", backup.created().to_rfc3339());
            println!(
                "signature: {}{}",
                backup.signature(),
                if known { "" } else { " (unknown to this build)" }
            );
            println!("salt:      {} bytes", backup.salt().len());
            println!("payload:   {} bytes", backup.ciphertext().len());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        // second press exits even when nothing is watching the token
        if handler_token.is_cancelled() {
            std::process::exit(130);
        }
        handler_token.cancel();
    })
    .context("failed to install Ctrl-C handler")?;

    run(cli, token).await
}
