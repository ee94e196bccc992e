//! Operator entry points for the poll decryption service.
//!
//! `keygen` writes a fresh 32-byte identity key, `pubkey` prints the
//! public half of an existing key, `serve` runs the HTTP service on top
//! of a filesystem store.

mod api;
mod config;

use std::fs::{self, OpenOptions};
use std::io::Write;

use anyhow::{bail, Context};
use ballotseal::{os_random, Crypto, Decrypter, FileStore, HybridCrypto};
use clap::{App, AppSettings, Arg, SubCommand};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroize;

use config::Config;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = App::new("ballotseald")
        .about("Poll decryption service: mints poll keys, decrypts and signs vote batches")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("serve")
                .about("Run the decryption service")
                .arg(
                    Arg::with_name("KEY")
                        .index(1)
                        .required(true)
                        .help("Path to the 32-byte identity key file"),
                )
                .arg(
                    Arg::with_name("port")
                        .long("port")
                        .short("p")
                        .takes_value(true)
                        .help("Port for the server, also BALLOTSEAL_PORT. Defaults to 9014"),
                )
                .arg(
                    Arg::with_name("store")
                        .long("store")
                        .takes_value(true)
                        .help("Directory for poll keys, also BALLOTSEAL_STORE. Defaults to poll_data"),
                ),
        )
        .subcommand(
            SubCommand::with_name("keygen")
                .about("Create an identity key file: 32 bytes of randomness")
                .arg(
                    Arg::with_name("KEY")
                        .index(1)
                        .required(true)
                        .help("Path to write the key file to"),
                ),
        )
        .subcommand(
            SubCommand::with_name("pubkey")
                .about("Print the hex public key for an identity key file")
                .arg(
                    Arg::with_name("KEY")
                        .index(1)
                        .required(true)
                        .help("Path to the identity key file"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        ("serve", Some(sub)) => {
            let mut cfg = Config::from_env();
            if let Some(port) = sub.value_of("port") {
                cfg.port = port.parse().context("parsing --port")?;
            }
            if let Some(store) = sub.value_of("store") {
                cfg.store_path = store.to_owned();
            }

            let mut seed = read_identity_key(sub.value_of("KEY").unwrap())?;
            let crypto = HybridCrypto::new(seed, os_random());
            seed.zeroize();

            let engine = Decrypter::new(crypto, FileStore::new(&cfg.store_path));
            println!(
                "public identity key: {}",
                hex::encode(engine.public_identity_key())
            );

            rocket::execute(api::serve(cfg.port, engine))
        }

        ("keygen", Some(sub)) => {
            let path = sub.value_of("KEY").unwrap();
            let mut key = [0u8; 32];
            OsRng
                .try_fill_bytes(&mut key)
                .context("reading randomness")?;

            let mut options = OpenOptions::new();
            options.write(true).create_new(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = options
                .open(path)
                .with_context(|| format!("creating key file {}", path))?;
            file.write_all(&key)
                .with_context(|| format!("writing key file {}", path))?;
            key.zeroize();

            println!("identity key written to {}", path);
            Ok(())
        }

        ("pubkey", Some(sub)) => {
            let mut seed = read_identity_key(sub.value_of("KEY").unwrap())?;
            let crypto = HybridCrypto::new(seed, os_random());
            seed.zeroize();

            println!("{}", hex::encode(crypto.public_identity_key()));
            Ok(())
        }

        _ => unreachable!("clap requires a subcommand"),
    }
}

fn read_identity_key(path: &str) -> anyhow::Result<[u8; 32]> {
    let data = fs::read(path).with_context(|| format!("reading identity key file {}", path))?;
    if data.len() < 32 {
        bail!("identity key file {} holds {} bytes, need 32", path, data.len());
    }

    let mut seed = [0u8; 32];
    seed.copy_from_slice(&data[..32]);
    Ok(seed)
}
