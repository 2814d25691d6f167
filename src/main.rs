use chrono::Local;

use doc_explainer::ai;
use doc_explainer::config::Config;
use doc_explainer::error::CredentialKind;
use doc_explainer::models::{mask_key, Session, SettingsPatch};
use doc_explainer::settings::{FileStorage, SettingsStore};
use doc_explainer::{App, AppError, Result};

const USAGE: &str = "\
Usage:
  doc-explainer <url>                    Explain a document and start a conversation
  doc-explainer --ask <id> <question>    Ask a follow-up question in a saved conversation
  doc-explainer --history                List saved conversations, newest first
  doc-explainer --show <id>              Print a saved conversation
  doc-explainer --delete <id>            Delete a saved conversation
  doc-explainer --settings               Show current settings
  doc-explainer --set <field>=<value>... Update settings
                                         (extraction-key, generation-key, model,
                                          level, level-text, prompt)
  doc-explainer --reset-settings         Restore default settings
";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Explain(String),
    Ask { id: String, question: String },
    History,
    Show(String),
    Delete(String),
    ShowSettings,
    Set(SettingsPatch),
    ResetSettings,
    Help,
}

fn parse_args(args: &[String]) -> Result<Command> {
    let missing = |what: &str| AppError::InvalidArgument(format!("missing {}\n\n{}", what, USAGE));

    let Some(first) = args.first() else {
        return Ok(Command::Help);
    };

    match first.as_str() {
        "-h" | "--help" => Ok(Command::Help),
        "--history" => Ok(Command::History),
        "--settings" => Ok(Command::ShowSettings),
        "--reset-settings" => Ok(Command::ResetSettings),
        "--show" => args
            .get(1)
            .map(|id| Command::Show(id.clone()))
            .ok_or_else(|| missing("session id")),
        "--delete" => args
            .get(1)
            .map(|id| Command::Delete(id.clone()))
            .ok_or_else(|| missing("session id")),
        "--ask" => {
            let id = args.get(1).ok_or_else(|| missing("session id"))?.clone();
            let question = args[2..].join(" ");
            if question.trim().is_empty() {
                return Err(missing("question"));
            }
            Ok(Command::Ask { id, question })
        }
        "--set" => {
            if args.len() < 2 {
                return Err(missing("field=value"));
            }
            let mut patch = SettingsPatch::default();
            for assignment in &args[1..] {
                patch.assign(assignment)?;
            }
            Ok(Command::Set(patch))
        }
        flag if flag.starts_with("--") => Err(AppError::InvalidArgument(format!(
            "unknown option '{}'\n\n{}",
            flag, USAGE
        ))),
        url => Ok(Command::Explain(url.to_string())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    if command == Command::Help {
        print!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load()?;
    let mut settings = SettingsStore::initialize(Box::new(FileStorage::new(&config.settings_dir)));

    match command {
        Command::ShowSettings => {
            print_settings(&settings);
            return Ok(());
        }
        Command::Set(patch) => {
            settings.save(patch)?;
            println!("Settings saved.");
            warn_missing_keys(&settings);
            return Ok(());
        }
        Command::ResetSettings => {
            settings.reset()?;
            println!("Settings reset to defaults.");
            return Ok(());
        }
        _ => {}
    }

    let app = App::new(&config).await?;
    let current = settings.get_all();

    match command {
        Command::Explain(url) => {
            if !current.missing_credentials().is_empty() {
                warn_missing_keys(&settings);
            }
            match app.start_new_session(&url, &current).await {
                Ok(session) => {
                    print_header(&session);
                    if let Some(turn) = session.turns.last() {
                        println!("{}", turn.text());
                    }
                    println!("\nSession: {}", session.id);
                }
                Err(failure) => {
                    if let Some(title) = &failure.title {
                        eprintln!("{}", title);
                    }
                    return Err(failure.source);
                }
            }
        }
        Command::Ask { id, question } => {
            if app.open_session(&id).await?.is_none() {
                return Err(AppError::InvalidArgument(format!("no session with id {}", id)));
            }
            let session = app.append_follow_up(&question, &current).await?;
            if let Some(turn) = session.turns.last() {
                println!("{}", turn.text());
            }
        }
        Command::History => {
            let summaries = app.history().await?;
            if summaries.is_empty() {
                println!("No saved conversations.");
            }
            for summary in summaries {
                let when = summary
                    .last_updated()
                    .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "{}  {}  {}",
                    summary.id,
                    when,
                    summary.title.as_deref().unwrap_or("(untitled)")
                );
            }
        }
        Command::Show(id) => match app.open_session(&id).await? {
            Some(session) => print_session(&session),
            None => println!("No session with id {}", id),
        },
        Command::Delete(id) => {
            app.delete_session(&id).await?;
            println!("Deleted {}", id);
        }
        Command::ShowSettings | Command::Set(_) | Command::ResetSettings | Command::Help => {}
    }

    Ok(())
}

fn print_header(session: &Session) {
    println!("# {}\n", session.display_title());
}

fn print_session(session: &Session) {
    print_header(session);
    println!("Source: {}\n", session.original_url);
    // The first user turn is the full generated prompt; skip it.
    for turn in session.turns.iter().skip(1) {
        println!("[{}]\n{}\n", turn.role.as_str(), turn.text());
    }
}

fn print_settings(settings: &SettingsStore) {
    let current = settings.get_all();
    println!(
        "extraction-key = {}",
        mask_key(&settings.get_key(CredentialKind::Extraction))
    );
    println!(
        "generation-key = {}",
        mask_key(&settings.get_key(CredentialKind::Generation))
    );
    println!("model          = {}", settings.get_model());
    match ai::level_description(current.user_level) {
        Some(description) => println!("level          = {} ({})", current.user_level, description),
        None => println!("level          = {} (no adjustment)", current.user_level),
    }
    println!("level-text     = {}", current.user_level_text);
    println!("prompt         = {}", current.additional_prompt);
}

fn warn_missing_keys(settings: &SettingsStore) {
    for kind in settings.get_all().missing_credentials() {
        eprintln!(
            "{} API key is not set. Use: doc-explainer --set {}-key=<key>",
            kind,
            kind.to_string().to_lowercase()
        );
    }
}
