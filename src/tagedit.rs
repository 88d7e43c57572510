use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use crate::config::AppContext;
use crate::scanner::{ImageEntry, SortOrder};
use crate::tags::{BulkReport, TagAction};

mod config;
mod fileops;
mod gui;
mod scanner;
mod state;
mod tags;

// --- CLI Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about = "Edit the comma-separated tag files that sit next to images.", long_about = None)]
struct Cli {
    /// Folder to open
    folder: Option<PathBuf>,

    /// Sort order: name, natural (defaults to the config file)
    #[arg(long)]
    sort: Option<String>,

    /// Create missing .txt files without asking
    #[arg(long)]
    create_missing: bool,

    /// Append TAG to every tag file in FOLDER and exit
    #[arg(long, value_name = "TAG")]
    append: Option<String>,

    /// Prepend TAG to every tag file in FOLDER and exit
    #[arg(long, value_name = "TAG")]
    prepend: Option<String>,

    /// Overwrite every tag file in FOLDER with TEXT and exit
    #[arg(long, value_name = "TEXT")]
    apply: Option<String>,

    /// Print each image with its tags and exit
    #[arg(long)]
    list: bool,

    /// Don't ask before bulk changes
    #[arg(long, short = 'y')]
    yes: bool,
}

enum BulkAction {
    Modify(TagAction, String),
    Apply(String),
}

impl Cli {
    fn validate(&self) -> Result<(), String> {
        if let Some(sort) = &self.sort
            && SortOrder::parse(sort).is_none()
        {
            return Err(format!("Invalid sort '{}'. Use one of: {}", sort, SortOrder::VALID.join(", ")));
        }

        let actions = [self.append.is_some(), self.prepend.is_some(), self.apply.is_some(), self.list]
            .iter()
            .filter(|&&a| a)
            .count();
        if actions > 1 {
            return Err("Use only one of --append, --prepend, --apply, --list".to_string());
        }
        if actions == 1 && self.folder.is_none() {
            return Err("FOLDER is required with --append, --prepend, --apply and --list".to_string());
        }

        for (flag, tag) in [("--append", &self.append), ("--prepend", &self.prepend)] {
            if let Some(t) = tag
                && t.trim().is_empty()
            {
                return Err(format!("{} needs a non-empty tag", flag));
            }
        }

        if let Some(ref dir) = self.folder {
            if !dir.exists() {
                return Err(format!("Folder does not exist: {:?}", dir));
            }
            if !dir.is_dir() {
                return Err(format!("Not a directory: {:?}", dir));
            }
        }

        Ok(())
    }

    fn bulk_action(&self) -> Option<BulkAction> {
        if let Some(tag) = &self.append {
            Some(BulkAction::Modify(TagAction::Append, tag.trim().to_string()))
        } else if let Some(tag) = &self.prepend {
            Some(BulkAction::Modify(TagAction::Prepend, tag.trim().to_string()))
        } else {
            self.apply.clone().map(BulkAction::Apply)
        }
    }

    fn is_headless(&self) -> bool {
        self.list || self.bulk_action().is_some()
    }
}

// --- CLI Helpers ---

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    io::stdout().flush().ok();
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

fn create_missing(entries: &[ImageEntry]) {
    let missing = scanner::missing_sidecars(entries);
    if missing.is_empty() {
        return;
    }
    let failures = scanner::create_sidecars(&missing);
    for (path, e) in &failures {
        eprintln!("Failed to create {:?}: {}", path, e);
    }
    println!("Created {} text files.", missing.len() - failures.len());
}

/// One `name<TAB>tags` row; multi-line tag files are folded onto one line.
fn listing_line(entry: &ImageEntry) -> Result<String, tags::TagError> {
    let text = tags::read_tags(&entry.sidecar)?;
    Ok(format!("{}\t{}", entry.file_name(), text.trim().replace('\n', " ")))
}

fn print_listing(entries: &[ImageEntry]) {
    for entry in entries {
        match listing_line(entry) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("{}", e),
        }
    }
}

fn report_bulk(report: &BulkReport, done: &str) -> anyhow::Result<()> {
    if report.is_ok() {
        println!("{} ({} files).", done, report.succeeded);
        Ok(())
    } else {
        eprintln!("{}", report.failure_summary("update"));
        anyhow::bail!("{} of {} files failed", report.failures.len(), report.failures.len() + report.succeeded)
    }
}

fn run_headless(args: &Cli, ctx: &AppContext, folder: &Path, sort: SortOrder) -> anyhow::Result<()> {
    let entries = scanner::scan_folder(folder, &ctx.scan_config.extensions, sort)?;
    if entries.is_empty() {
        println!("{}", state::NO_IMAGES_MESSAGE);
        return Ok(());
    }

    if args.create_missing {
        create_missing(&entries);
    }

    if args.list {
        print_listing(&entries);
        return Ok(());
    }

    let sidecars: Vec<PathBuf> = entries.iter().map(|e| e.sidecar.clone()).collect();
    match args.bulk_action() {
        Some(BulkAction::Modify(action, tag)) => {
            let prompt = format!("This will {} the tag '{}' to all {} txt files. Continue?", action.verb(), tag, sidecars.len());
            if !args.yes && !confirm(&prompt) {
                println!("Aborted.");
                return Ok(());
            }
            let report = tags::modify_all(&sidecars, &tag, action);
            report_bulk(&report, &format!("Tags {} to all files", action.past()))
        }
        Some(BulkAction::Apply(text)) => {
            let prompt = format!("This will overwrite all {} txt files with the given content. Continue?", sidecars.len());
            if !args.yes && !confirm(&prompt) {
                println!("Aborted.");
                return Ok(());
            }
            let report = tags::apply_to_all(&sidecars, &text);
            report_bulk(&report, "Applied tags to all files")
        }
        None => Ok(()),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Cli::parse();
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let mut ctx = AppContext::new().context("Failed to load configuration")?;
    if let Some(sort) = &args.sort {
        ctx.scan_config.sort = sort.to_lowercase();
    }
    let sort = ctx.scan_config.sort_order();

    if args.is_headless() {
        // validate() guarantees a folder for every headless action
        let Some(folder) = args.folder.as_ref() else { return Ok(()) };
        return run_headless(&args, &ctx, folder, sort);
    }

    log::info!("Launching GUI...");
    let app = gui::GuiApp::new(ctx, args.folder.clone(), args.create_missing);
    if let Err(e) = app.run() {
        eprintln!("GUI Error: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tagedit").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_no_args_is_gui() {
        let cli = parse(&[]);
        assert!(cli.validate().is_ok());
        assert!(!cli.is_headless());
    }

    #[test]
    fn test_action_requires_folder() {
        assert!(parse(&["--append", "cat"]).validate().is_err());
        assert!(parse(&["--list"]).validate().is_err());
    }

    #[test]
    fn test_actions_are_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().to_str().unwrap();
        assert!(parse(&[folder, "--append", "a", "--prepend", "b"]).validate().is_err());
        assert!(parse(&[folder, "--apply", "a", "--list"]).validate().is_err());
        assert!(parse(&[folder, "--apply", "a"]).validate().is_ok());
    }

    #[test]
    fn test_folder_must_be_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, b"x").unwrap();
        assert!(parse(&[file.to_str().unwrap()]).validate().is_err());
        assert!(parse(&[dir.path().join("nope").to_str().unwrap()]).validate().is_err());
    }

    #[test]
    fn test_bad_sort_and_blank_tag_rejected() {
        assert!(parse(&["--sort", "date"]).validate().is_err());
        assert!(parse(&["--sort", "Natural"]).validate().is_ok());
        let dir = tempfile::tempdir().unwrap();
        assert!(parse(&[dir.path().to_str().unwrap(), "--prepend", "  "]).validate().is_err());
    }

    #[test]
    fn test_headless_append_with_yes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"x").unwrap();
        std::fs::write(dir.path().join("a.txt"), "cat").unwrap();
        std::fs::write(dir.path().join("b.png"), b"x").unwrap();

        let cli = parse(&[dir.path().to_str().unwrap(), "--append", " pet ", "--yes"]);
        assert!(cli.validate().is_ok());
        let ctx = AppContext::in_memory();
        run_headless(&cli, &ctx, dir.path(), SortOrder::Name).unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "cat, pet");
        assert_eq!(std::fs::read_to_string(dir.path().join("b.txt")).unwrap(), "pet");
    }

    fn folder(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    #[test]
    fn test_headless_list_reads_without_writing() {
        let dir = folder(&[("a.png", "x"), ("a.txt", "cat,\ndog\n"), ("b.png", "x")]);
        let cli = parse(&[dir.path().to_str().unwrap(), "--list"]);
        assert!(cli.validate().is_ok());
        assert!(cli.is_headless());

        let entries = scanner::scan_folder(dir.path(), &scanner::default_extensions(), SortOrder::Name).unwrap();
        assert_eq!(listing_line(&entries[0]).unwrap(), "a.png\tcat, dog");
        assert_eq!(listing_line(&entries[1]).unwrap(), "b.png\t");

        run_headless(&cli, &AppContext::in_memory(), dir.path(), SortOrder::Name).unwrap();
        assert!(!dir.path().join("b.txt").exists());
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "cat,\ndog\n");
    }

    #[test]
    fn test_headless_list_with_create_missing() {
        let dir = folder(&[("a.png", "x"), ("b.gif", "x")]);
        let cli = parse(&[dir.path().to_str().unwrap(), "--list", "--create-missing"]);
        run_headless(&cli, &AppContext::in_memory(), dir.path(), SortOrder::Name).unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "");
        assert_eq!(std::fs::read_to_string(dir.path().join("b.txt")).unwrap(), "");
    }

    #[test]
    fn test_headless_apply_with_yes() {
        let dir = folder(&[("a.png", "x"), ("a.txt", "old"), ("b.webp", "x"), ("notes.txt", "keep")]);
        let cli = parse(&[dir.path().to_str().unwrap(), "--apply", "one, two", "-y"]);
        run_headless(&cli, &AppContext::in_memory(), dir.path(), SortOrder::Name).unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "one, two");
        assert_eq!(std::fs::read_to_string(dir.path().join("b.txt")).unwrap(), "one, two");
        assert_eq!(std::fs::read_to_string(dir.path().join("notes.txt")).unwrap(), "keep");
    }

    #[test]
    fn test_headless_bulk_failure_is_error() {
        let dir = folder(&[("a.png", "x")]);
        // A directory where the sidecar should be makes the write fail
        std::fs::create_dir(dir.path().join("a.txt")).unwrap();
        std::fs::write(dir.path().join("a.txt").join("inner"), "x").unwrap();
        let cli = parse(&[dir.path().to_str().unwrap(), "--apply", "t", "--yes"]);
        assert!(run_headless(&cli, &AppContext::in_memory(), dir.path(), SortOrder::Name).is_err());
    }
}
