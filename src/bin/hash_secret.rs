//! Produce an argon2 digest for `store.seed[].secret_digest` or the
//! `identity.secret_digest` column.
//!
//! $ cargo run --bin hash_secret -- 'Secret1'

use clap::Parser;
use std::io::{self, BufRead};
use tollgate::application_impl::Argon2PasswordHasher;
use tollgate::application_port::CredentialHasher;

#[derive(Parser, Debug)]
#[command(name = "hash_secret", about = "Hash a secret with argon2id")]
struct Args {
    /// Secret to hash; read from the first line of stdin when omitted.
    secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let secret = match args.secret {
        Some(secret) => secret,
        None => {
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    if secret.is_empty() {
        anyhow::bail!("refusing to hash an empty secret");
    }

    let digest = Argon2PasswordHasher::new().hash_password(&secret).await?;
    println!("{}", digest);
    Ok(())
}
