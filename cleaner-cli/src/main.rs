use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use save_cleaner_core::{
    capture_from_file, describe_save, patch_path, CleanerError, Result, Template, TemplateStore,
};

#[derive(Debug, Parser)]
#[command(
    name = "e5-save-cleaner",
    version,
    about = "Brigade E5 cycle-safe save cleaner"
)]
struct Args {
    /// Where the captured clean block is kept. Defaults to the user config
    /// directory.
    #[arg(long, global = true, value_name = "FILE")]
    template: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Capture the clean ConsoleInfo block from an unmodified save.
    Capture {
        #[arg(value_name = "SAVE")]
        save: PathBuf,
    },
    /// Clean cheated saves in place, backing up each original first.
    Patch {
        /// Save files, or directories searched for .nsv / .dat saves.
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },
    /// Print the envelope and stream layout of a save.
    Inspect {
        #[arg(value_name = "SAVE")]
        save: PathBuf,
    },
}

fn default_template_path() -> Option<PathBuf> {
    let mut base = dirs::config_dir().or_else(dirs::data_dir)?;
    base.push("E5SaveCleaner");
    base.push("template.json");
    Some(base)
}

fn file_label(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn run(args: Args) -> Result<()> {
    let template_path = args.template.or_else(default_template_path);

    match args.command {
        Command::Capture { save } => {
            let store_path = template_path.ok_or_else(|| {
                CleanerError::Template(
                    "no config directory available, pass --template <FILE>".to_string(),
                )
            })?;

            let Some(template) = capture_from_file(&save)? else {
                eprintln!("Couldn't locate ConsoleInfo in {}.", file_label(&save));
                std::process::exit(1);
            };

            TemplateStore::new(&template, Some(&save)).save(&store_path)?;
            info!(path = %store_path.display(), "saved template");
            println!("Captured clean block from {}", file_label(&save));
        }
        Command::Patch { paths } => {
            let template = match &template_path {
                Some(path) => TemplateStore::load_or_default(path)?,
                None => Template::default(),
            };

            for path in &paths {
                for report in patch_path(path, &template)? {
                    let name = file_label(&report.path);
                    match &report.backup {
                        Some(backup) => {
                            println!("Patched {} (backup: {})", name, file_label(backup));
                            if report.truncated > 0 {
                                println!(
                                    "  warning: {} stream(s) did not fit and were truncated",
                                    report.truncated
                                );
                            }
                        }
                        None => println!("No changes needed for {}", name),
                    }
                }
            }
        }
        Command::Inspect { save } => {
            let raw = fs::read(&save)?;
            print!("{}", describe_save(&raw)?);
        }
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(err) = run(args) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn patch_accepts_several_paths_and_template_override() {
        let args = Args::try_parse_from([
            "e5-save-cleaner",
            "patch",
            "a.nsv",
            "saves",
            "--template",
            "t.json",
        ])
        .unwrap();
        assert_eq!(args.template, Some(PathBuf::from("t.json")));
        match args.command {
            Command::Patch { paths } => {
                assert_eq!(paths, vec![PathBuf::from("a.nsv"), PathBuf::from("saves")]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn patch_requires_a_path() {
        assert!(Args::try_parse_from(["e5-save-cleaner", "patch"]).is_err());
    }
}
