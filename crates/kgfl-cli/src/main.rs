mod cli;
mod commands;
mod config;
mod observability;
mod output;
mod session;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands, ConfigCommands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    observability::init_tracing_with_level(cli.log_level.as_deref().unwrap_or("warn"));

    let profile = &cli.profile;
    let profile_cfg = config::load_profile(profile)?;
    let format = config::resolve_format(cli.format, &profile_cfg);

    match &cli.command {
        Commands::Logout => return commands::auth::logout(profile),
        Commands::Config(args) => {
            return match &args.command {
                ConfigCommands::Show => {
                    println!("{}: {}", "Profile".cyan(), profile);
                    println!(
                        "{}: {}",
                        "Server".cyan(),
                        profile_cfg.server.as_deref().unwrap_or("(not set)")
                    );
                    println!(
                        "{}: {}",
                        "Format".cyan(),
                        profile_cfg.format.as_deref().unwrap_or("json")
                    );
                    println!(
                        "{}: {}",
                        "Credentials".cyan(),
                        config::credentials_path(profile)?.display()
                    );
                    Ok(())
                }
                ConfigCommands::Set(set_args) => {
                    let mut updated = profile_cfg.clone();
                    config::set_key(&mut updated, &set_args.key, &set_args.value)?;
                    config::save_profile(profile, &updated)?;
                    output::print_success(&format!("Set {} = {}", set_args.key, set_args.value));
                    Ok(())
                }
            };
        }
        _ => {}
    }

    let settings =
        config::resolve_settings(cli.config.as_deref(), cli.server.as_deref(), &profile_cfg)?;
    if cli.log_level.is_none() && std::env::var_os("RUST_LOG").is_none() {
        observability::apply_logging_level(&settings.logging.level);
    }
    let ctx = session::open(settings, profile)?;

    let result = match &cli.command {
        Commands::Login(args) => {
            commands::auth::login(&ctx, &args.username, &args.password).await
        }
        Commands::Whoami => commands::auth::whoami(&ctx, profile).await,
        Commands::Get(args) => commands::read::get(&ctx, &args.target, &args.params, format).await,
        Commands::Send(args) => {
            commands::write::send(
                &ctx,
                args.method,
                &args.path,
                args.file.as_deref(),
                &args.invalidate,
                format,
            )
            .await
        }
        Commands::Logout | Commands::Config(_) => Ok(()),
    };

    ctx.shutdown();
    result
}
