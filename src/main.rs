use std::process;

use clap::{Parser, Subcommand};

use vidgro_runtime_api::server::{build_backup_generator, load_config, run_serve};

#[derive(Parser, Debug)]
#[command(name = "vidgro-api")]
#[command(version)]
#[command(about = "Runtime config distribution and database backups for VidGro", long_about = None)]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Hostname to bind to
        #[arg(long)]
        hostname: Option<String>,

        /// Path to the server config file
        #[arg(short = 'c', long = "config", default_value = "vidgro-api.toml")]
        config: String,
    },
    /// Generate a one-off database backup and print the result as JSON
    Backup {
        /// Backup type label recorded in the dump header
        #[arg(long = "type", default_value = "manual")]
        backup_type: String,

        /// Custom backup filename (".sql" appended when missing)
        #[arg(long)]
        name: Option<String>,

        /// Path to the server config file
        #[arg(short = 'c', long = "config", default_value = "vidgro-api.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.cmd {
        Command::Serve {
            port,
            hostname,
            config,
        } => {
            run_serve(&config, port, hostname).await;
        }
        Command::Backup {
            backup_type,
            name,
            config,
        } => {
            let config = load_config(&config, None, None);
            let generator = build_backup_generator(&config);

            match generator.generate(&backup_type, name.as_deref()).await {
                Ok(result) => {
                    let storage = result.storage().map(|location| match location {
                        vidgro_runtime_api::backup::BackupLocation::Storage {
                            bucket,
                            path,
                            public_url,
                            signed_url,
                        } => serde_json::json!({
                            "bucket": bucket,
                            "path": path,
                            "publicUrl": public_url,
                            "signedUrl": signed_url,
                        }),
                        _ => serde_json::Value::Null,
                    });
                    let summary = serde_json::json!({
                        "filename": result.filename,
                        "sizeBytes": result.size_bytes,
                        "generatedAt": result.generated_at,
                        "storage": storage,
                        "inlineTokenBytes": result.inline_token().len(),
                    });
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&summary)
                            .unwrap_or_else(|_| summary.to_string())
                    );
                }
                Err(e) => {
                    eprintln!("Backup failed: {}", e);
                    process::exit(1);
                }
            }
        }
    }
}
