//! Cabin CLI entry point.
//!
//! Drives a single Lima-backed guest per profile: lifecycle verbs, guest
//! environment lookups, the guest config store and command execution.

mod command;
mod settings;

use cabin_env::{
    collect_dependencies, Dependencies, Guest, GuestActions, GuestBackend, Host, RunActions,
};
use cabin_lima::LimaBackend;
use clap::Parser;
use command::{Cli, Command};
use settings::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    // Logs go to stderr, stdout carries command output
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("cabin=info".parse()?)
                .add_directive("cabin_env=info".parse()?)
                .add_directive("cabin_lima=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let command = Cli::parse().command;

    let host = Host::new();
    let settings = Settings::from_host(&host);
    settings.validate()?;
    tracing::debug!(?settings, "Configuration loaded");

    let backend = LimaBackend::new(host.clone(), &settings.profile, &settings.state_dir)
        .with_vm_type(settings.vm_type);
    let guest = Guest::new(host, backend);

    if command.is_lifecycle() {
        tracing::info!(profile = %settings.profile, ?command, "Running lifecycle command");
    }

    let result = match command {
        Command::Start => guest.start(&settings.guest),
        Command::Stop => guest.stop(),
        Command::Restart => guest.restart(),
        Command::Status => {
            println!("profile: {}", settings.profile);
            println!("state: {}", guest.state());
            if let Ok(Some(config)) = guest.backend().last_config() {
                println!(
                    "cpus: {}, memory: {}GiB, disk: {}GiB, arch: {}, runtime: {}",
                    config.cpus, config.memory_gib, config.disk_gib, config.arch, config.runtime
                );
            }
            Ok(())
        }
        Command::Env { name } => guest.env(&name).map(|value| println!("{value}")),
        Command::Get { key } => {
            println!("{}", guest.get(&key));
            Ok(())
        }
        Command::Set { key, value } => guest.set(&key, &value),
        Command::Run { args } => {
            let cmd: Vec<&str> = args.iter().map(String::as_str).collect();
            guest.run_interactive(&cmd)
        }
        Command::Shell => guest.run_interactive(&["sh", "-l"]),
        Command::Deps => {
            let deps = collect_dependencies(&[&guest as &dyn Dependencies]);
            let missing: Vec<&String> = deps
                .iter()
                .filter(|dep| which(guest.host(), installed_binary(dep)).is_none())
                .collect();
            for dep in &deps {
                let mark = if missing.contains(&dep) { "missing" } else { "ok" };
                println!("{dep}: {mark}");
            }
            if !missing.is_empty() {
                anyhow::bail!("{} missing dependencies", missing.len());
            }
            Ok(())
        }
    };

    // Pass the guest command's exit status through unchanged
    if let Err(err) = result {
        match err.exit_status() {
            Some(status) if status > 0 => {
                tracing::debug!(error = %err, "Command failed");
                eprintln!("{err}");
                std::process::exit(status);
            }
            _ => return Err(err.into()),
        }
    }
    Ok(())
}

/// Program whose presence on the host shows that package `dep` is installed.
fn installed_binary(dep: &str) -> &str {
    match dep {
        "lima" => "limactl",
        "qemu" => "qemu-img",
        other => other,
    }
}

/// Resolve a program on the host `PATH`.
fn which(host: &Host, program: &str) -> Option<String> {
    let script = format!("command -v {program}");
    host.run_output(&["sh", "-c", script.as_str()])
        .ok()
        .filter(|path| !path.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installed_binary() {
        assert_eq!(installed_binary("lima"), "limactl");
        assert_eq!(installed_binary("qemu"), "qemu-img");
        assert_eq!(installed_binary("sh"), "sh");
    }

    #[test]
    fn test_which_resolves_host_programs() {
        let host = Host::new();
        assert!(which(&host, installed_binary("sh")).is_some());
        assert!(which(&host, "cabin-definitely-not-a-program").is_none());
    }
}
