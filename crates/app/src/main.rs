use std::fmt;
use std::str::FromStr;

use hsc_core::generator::RedactionPolicy;
use hsc_core::model::{BookId, CardFilter, CardId, CardSetId, DifficultyLevel, ThemeId, UserId};
use hsc_core::study::{Advance, StudyPhase, StudySession};
use services::{AppServices, Clock, Config, Restore, StudyNavigator, UndoStack};
use storage::seed::seed_demo_content;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt as log_fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DUE_LIMIT: u32 = 20;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { command: &'static str, flag: &'static str },
    UnknownArg(String),
    InvalidValue { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    ConflictingSources,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { command, flag } => write!(f, "{command} requires {flag}"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidValue { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::ConflictingSources => {
                write!(f, "study takes at most one of --book, --set, --due")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_value<T: FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<T, ArgsError> {
    let raw = require_value(args, flag)?;
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidValue { flag, raw })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Seed,
    Books,
    Generate,
    Cards,
    Sets,
    Study,
    Progress,
    Report,
    Essay,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "seed" => Some(Self::Seed),
            "books" => Some(Self::Books),
            "generate" => Some(Self::Generate),
            "cards" => Some(Self::Cards),
            "sets" => Some(Self::Sets),
            "study" => Some(Self::Study),
            "progress" => Some(Self::Progress),
            "report" => Some(Self::Report),
            "essay" => Some(Self::Essay),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Books => "books",
            Self::Generate => "generate",
            Self::Cards => "cards",
            Self::Sets => "sets",
            Self::Study => "study",
            Self::Progress => "progress",
            Self::Report => "report",
            Self::Essay => "essay",
        }
    }
}

/// Flags shared by every subcommand; each command checks the ones it needs.
#[derive(Debug, Default)]
struct Args {
    db_url: Option<String>,
    user: Option<UserId>,
    book: Option<BookId>,
    set: Option<CardSetId>,
    themes: Vec<ThemeId>,
    search: Option<String>,
    difficulty: Option<DifficultyLevel>,
    blanks: Option<usize>,
    all: bool,
    due: bool,
    limit: Option<u32>,
    create: Option<String>,
    add: Vec<CardId>,
    remove: Vec<CardId>,
    file: Option<String>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = Some(value);
                }
                "--user" => parsed.user = Some(parse_value(args, "--user")?),
                "--book" => parsed.book = Some(parse_value(args, "--book")?),
                "--set" => parsed.set = Some(parse_value(args, "--set")?),
                "--theme" => parsed.themes.push(parse_value(args, "--theme")?),
                "--search" => parsed.search = Some(require_value(args, "--search")?),
                "--difficulty" => {
                    let raw = require_value(args, "--difficulty")?;
                    let level = raw
                        .trim()
                        .parse::<u8>()
                        .ok()
                        .and_then(|n| DifficultyLevel::new(n).ok())
                        .ok_or(ArgsError::InvalidValue {
                            flag: "--difficulty",
                            raw,
                        })?;
                    parsed.difficulty = Some(level);
                }
                "--blanks" => parsed.blanks = Some(parse_value(args, "--blanks")?),
                "--all" => parsed.all = true,
                "--due" => parsed.due = true,
                "--limit" => parsed.limit = Some(parse_value(args, "--limit")?),
                "--create" => parsed.create = Some(require_value(args, "--create")?),
                "--add" => parsed.add.push(parse_value(args, "--add")?),
                "--remove" => parsed.remove.push(parse_value(args, "--remove")?),
                "--file" => parsed.file = Some(require_value(args, "--file")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    fn user(&self, command: Command) -> Result<UserId, ArgsError> {
        self.user.ok_or(ArgsError::MissingFlag {
            command: command.name(),
            flag: "--user",
        })
    }

    fn book(&self, command: Command) -> Result<BookId, ArgsError> {
        self.book.ok_or(ArgsError::MissingFlag {
            command: command.name(),
            flag: "--book",
        })
    }

    fn card_filter(&self) -> CardFilter {
        let mut filter = CardFilter::default().themes(self.themes.iter().copied());
        filter.book_id = self.book;
        filter.search.clone_from(&self.search);
        filter.difficulty_level = self.difficulty;
        if self.all {
            filter.only_active = false;
            filter.include_archived = true;
        }
        filter
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- <command> [--db <sqlite_url>] [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  seed                                   Load the demo books, quotes and cards");
    eprintln!("  books                                  List books and themes with their ids");
    eprintln!("  generate --book <id> [--blanks <n>]    Make a card for every active quote");
    eprintln!("  cards [--book <id>] [--theme <id>]... [--search <text>]");
    eprintln!("        [--difficulty <1-5>] [--all]     List cards (--all shows hidden ones)");
    eprintln!("  sets --user <uuid> [--create <name>]");
    eprintln!("       [--set <id> --add <card>... --remove <card>...]");
    eprintln!("  study --user <uuid> [--book <id> | --set <id> | --due] [--limit <n>]");
    eprintln!("                                         Answer cards; :back, :forward, :quit");
    eprintln!("  progress --user <uuid>                 Per-book statistics and totals");
    eprintln!("  report --user <uuid>                   The last seven days");
    eprintln!("  essay --file <path>                    Essay feedback from the AI collaborator");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  HSC_DB_URL, HSC_AI_API_KEY, HSC_AI_BASE_URL, HSC_AI_MODEL, RUST_LOG");
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn,services=info".into()))
        .with(log_fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Make sure a file-backed database has a file and a parent directory.
fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" || db_url.contains("mode=memory") {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .or_else(|| db_url.strip_prefix("sqlite:"))
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let mut config = Config::from_env()?;
    if let Some(db_url) = &args.db_url {
        config.database_url.clone_from(db_url);
    }
    prepare_sqlite_file(&config.database_url)?;

    let clock = Clock::System;
    let app = AppServices::new_sqlite(&config, clock).await?;

    match cmd {
        Command::Seed => seed(&app, clock).await,
        Command::Books => books(&app).await,
        Command::Generate => generate(&app, &args).await,
        Command::Cards => cards(&app, &args).await,
        Command::Sets => sets(&app, &args).await,
        Command::Study => study(&app, &args, clock).await,
        Command::Progress => progress(&app, &args).await,
        Command::Report => report(&app, &args).await,
        Command::Essay => essay(&app, &args).await,
    }
}

//
// ─── COMMANDS ──────────────────────────────────────────────────────────────────
//

async fn seed(app: &AppServices, clock: Clock) -> Result<(), Box<dyn std::error::Error>> {
    let report = seed_demo_content(app.storage(), clock.now()).await?;
    if report.skipped {
        println!("database already holds books; nothing seeded");
    } else {
        println!(
            "Seeded {} books, {} themes, {} quotes and {} cards",
            report.books, report.themes, report.quotes, report.cards
        );
    }
    Ok(())
}

async fn books(app: &AppServices) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = app.catalog();
    println!("Books:");
    for book in catalog.list_books().await? {
        match &book.author {
            Some(author) => println!("  {:>4}  {} ({author})", book.id, book.title),
            None => println!("  {:>4}  {}", book.id, book.title),
        }
    }
    println!("Themes:");
    for theme in catalog.list_themes().await? {
        println!("  {:>4}  {}", theme.id(), theme.name().as_str());
    }
    Ok(())
}

async fn generate(app: &AppServices, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let book_id = args.book(Command::Generate)?;
    let policy = match args.blanks {
        Some(blanks) => RedactionPolicy::with_blanks(blanks)?,
        None => RedactionPolicy::default(),
    };

    let run = app.catalog().generate_for_book(book_id, &policy).await?;
    println!(
        "{}: generated {} card(s)",
        run.book.title,
        run.generated.len()
    );
    for card in &run.generated {
        println!("  {:>4}  {}", card.id(), card.card_text());
    }
    for failure in &run.failures {
        println!("  skipped \"{}\": {}", failure.quote_title, failure.error);
    }
    Ok(())
}

async fn cards(app: &AppServices, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let cards = app.catalog().list_cards(&args.card_filter()).await?;
    if cards.is_empty() {
        println!("no cards match");
        return Ok(());
    }
    for card in &cards {
        let mut flags = String::new();
        if !card.is_active() {
            flags.push_str(" [inactive]");
        }
        if card.is_archived() {
            flags.push_str(" [archived]");
        }
        println!(
            "{:>4}  d{}  {}{flags}",
            card.id(),
            card.difficulty().value(),
            card.card_text()
        );
    }
    Ok(())
}

async fn sets(app: &AppServices, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let user = args.user(Command::Sets)?;
    let sets = app.sets();

    if let Some(name) = &args.create {
        let set = sets.create_set(user, name, None).await?;
        println!("created set {} ({})", set.id(), set.name());
    }
    if !args.add.is_empty() || !args.remove.is_empty() {
        let set_id = args.set.ok_or(ArgsError::MissingFlag {
            command: Command::Sets.name(),
            flag: "--set",
        })?;
        for card_id in &args.add {
            sets.add_card(user, set_id, *card_id).await?;
        }
        for card_id in &args.remove {
            sets.remove_card(user, set_id, *card_id).await?;
        }
    }

    for summary in sets.list_sets(user).await? {
        println!(
            "{:>4}  {}  ({} card(s))",
            summary.set.id(),
            summary.set.name(),
            summary.card_count
        );
    }
    Ok(())
}

async fn study(
    app: &AppServices,
    args: &Args,
    clock: Clock,
) -> Result<(), Box<dyn std::error::Error>> {
    let user = args.user(Command::Study)?;
    let sources = [args.book.is_some(), args.set.is_some(), args.due]
        .into_iter()
        .filter(|picked| *picked)
        .count();
    if sources > 1 {
        return Err(ArgsError::ConflictingSources.into());
    }

    let service = app.study();
    let session = if let Some(set_id) = args.set {
        service.start_from_set(user, set_id).await?
    } else if args.due {
        service
            .start_due(user, args.limit.unwrap_or(DEFAULT_DUE_LIMIT))
            .await?
    } else {
        service.start_from_filter(&args.card_filter()).await?
    };

    let mut nav = StudyNavigator::new(session, UndoStack::new());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let phase = nav.session().phase();
        if matches!(phase, StudyPhase::Complete | StudyPhase::Ended) {
            break;
        }
        show_card(nav.session());

        let Some(line) = lines.next_line().await? else {
            let tally = service.end_session(nav.session_mut());
            println!("\nsession ended: {tally}");
            return Ok(());
        };

        match line.trim() {
            ":quit" => {
                let tally = service.end_session(nav.session_mut());
                println!("session ended: {tally}");
                return Ok(());
            }
            ":back" => report_restore(nav.back(clock.now())),
            ":forward" => report_restore(nav.forward(clock.now())),
            _ if phase == StudyPhase::Answered => {
                let (advance, action) = service.next(nav.session_mut())?;
                nav.record(action);
                if let Advance::Complete(tally) = advance {
                    println!("session complete: {tally}");
                }
            }
            answer => {
                let action = nav.session_mut().set_input(answer)?;
                nav.record(action);
                match service.check_answer(user, nav.session_mut()).await {
                    Ok(outcome) => {
                        nav.record(outcome.action);
                        if outcome.is_correct {
                            println!("correct");
                        } else {
                            println!("not quite; expected: {}", outcome.expected);
                            let ai = app.ai();
                            if ai.enabled() {
                                let card = &nav.session().current().card;
                                println!("tip: {}", ai.generate_tip(card.card_text()).await);
                            }
                        }
                    }
                    Err(err) => println!("could not check the answer: {err}"),
                }
            }
        }
    }
    Ok(())
}

fn show_card(session: &StudySession) {
    let slot = session.current();
    println!();
    println!(
        "[{}/{}] {}",
        session.cursor() + 1,
        session.len(),
        slot.card.card_text()
    );
    match slot.result {
        Some(true) => println!("answered correctly. press enter for the next card"),
        Some(false) => println!(
            "answered: {} (expected {}). press enter for the next card",
            slot.input,
            slot.card.expected_answer()
        ),
        None if !slot.input.is_empty() => println!("draft: {}", slot.input),
        None => {}
    }
}

fn report_restore(restore: Restore) {
    match restore {
        Restore::Snapshot => {}
        Restore::Fresh => println!("history entry was unreadable; starting over"),
        Restore::Unchanged => println!("nothing to go to"),
    }
}

async fn progress(app: &AppServices, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let user = args.user(Command::Progress)?;
    let progress = app.progress();

    for text in progress.flashcard_progress(user).await? {
        let time = text
            .completion_time_secs
            .map_or_else(|| "-".to_string(), |secs| format!("{secs:.1}s"));
        println!(
            "{}: {}/{} mastered, accuracy {:.0}%, avg answer {time}",
            text.book_title,
            text.mastered_flashcards,
            text.total_flashcards,
            text.average_accuracy * 100.0
        );
    }

    let summary = progress.user_progress(user).await?;
    println!(
        "studied {} card(s), mastered {}, due {}; {}/{} correct ({:.0}%); streak {} day(s)",
        summary.cards_studied,
        summary.cards_mastered,
        summary.cards_due,
        summary.correct_attempts,
        summary.total_attempts,
        summary.accuracy * 100.0,
        summary.current_streak_days
    );
    Ok(())
}

async fn report(app: &AppServices, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let user = args.user(Command::Report)?;
    let weekly = app.progress().weekly_report(user).await?;
    for day in &weekly.days {
        println!("{}  {:>3} attempt(s), {:>3} correct", day.day, day.attempts, day.correct);
    }
    println!(
        "week: {}/{} correct ({:.0}%), {} card(s) mastered",
        weekly.correct_attempts,
        weekly.total_attempts,
        weekly.accuracy * 100.0,
        weekly.cards_mastered
    );
    Ok(())
}

async fn essay(app: &AppServices, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let path = args.file.as_deref().ok_or(ArgsError::MissingFlag {
        command: Command::Essay.name(),
        flag: "--file",
    })?;
    let content = tokio::fs::read_to_string(path).await?;
    let feedback = app.ai().grade_essay(&content).await;

    match feedback.band {
        Some(band) => println!("Band {band}: {}", feedback.summary),
        None => println!("{}", feedback.summary),
    }
    for strength in &feedback.strengths {
        println!("  + {strength}");
    }
    for improvement in &feedback.improvements {
        println!("  - {improvement}");
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
