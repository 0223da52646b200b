use anyhow::{Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

const VAULT_PASSWORD_ENV: &str = "VAULTKEEP_PASSWORD";
const BACKUP_PASSWORD_ENV: &str = "VAULTKEEP_BACKUP_PASSWORD";

/// Password for the local vault.
///
/// Tried in order: `VAULTKEEP_PASSWORD`, one line of piped stdin, then an
/// interactive prompt.
pub fn read_password() -> Result<Zeroizing<String>> {
    if let Some(pw) = from_env(VAULT_PASSWORD_ENV) {
        return Ok(pw);
    }

    //  echo "supersecret" | vaultkeep list
    if !io::stdin().is_terminal() {
        let pw = read_stdin_line()?;
        if !pw.is_empty() {
            return Ok(pw);
        }
    } else {
        let pw = Zeroizing::new(rpassword::prompt_password("Vault password: ")?);
        if !pw.is_empty() {
            return Ok(pw);
        }
    }

    bail!("no vault password provided")
}

/// Password for a new vault. Prompts twice unless it comes from the
/// environment.
pub fn read_new_password() -> Result<Zeroizing<String>> {
    if let Some(pw) = from_env(VAULT_PASSWORD_ENV) {
        return Ok(pw);
    }
    confirmed("New vault password: ", "Confirm vault password: ")
}

/// Password protecting a backup file. `confirm` asks twice, for when the
/// password is being chosen rather than recalled.
pub fn read_backup_password(confirm: bool) -> Result<Zeroizing<String>> {
    if let Some(pw) = from_env(BACKUP_PASSWORD_ENV) {
        return Ok(pw);
    }

    if confirm {
        return confirmed("Backup password: ", "Confirm backup password: ");
    }

    let pw = if io::stdin().is_terminal() {
        Zeroizing::new(rpassword::prompt_password("Backup password: ")?)
    } else {
        read_stdin_line()?
    };
    if pw.is_empty() {
        bail!("no backup password provided");
    }
    Ok(pw)
}

fn from_env(name: &str) -> Option<Zeroizing<String>> {
    std::env::var(name)
        .ok()
        .filter(|pw| !pw.is_empty())
        .map(Zeroizing::new)
}

fn confirmed(prompt: &str, confirm_prompt: &str) -> Result<Zeroizing<String>> {
    let (pw1, pw2) = if io::stdin().is_terminal() {
        (
            Zeroizing::new(rpassword::prompt_password(prompt)?),
            Zeroizing::new(rpassword::prompt_password(confirm_prompt)?),
        )
    } else {
        (read_stdin_line()?, read_stdin_line()?)
    };

    if pw1.is_empty() {
        bail!("password cannot be empty");
    }
    if pw1 != pw2 {
        bail!("passwords do not match");
    }
    Ok(pw1)
}

fn read_stdin_line() -> Result<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    io::stdin().lock().read_line(&mut line)?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}
