use std::io::Write;

use clap::{Args, Parser, Subcommand};
use freddy_chat::agents::UsageRecord;
use freddy_chat::config::normalize_base_url;
use freddy_chat::grouping::Side;
use freddy_chat::sse::StreamEvent;
use freddy_chat::threads::{DEFAULT_THREAD_ICON, group_by_activity};
use freddy_chat::{Applied, ChatConfig, ChatError, ChatSession, HttpBackend, TurnOutcome};
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("stdin read failed: {0}")]
    Stdin(#[from] std::io::Error),
    #[error("no user session loaded")]
    NoSession,
}

#[derive(Parser, Debug)]
#[command(name = "freddy-chat", about = "FreddyAI chat client")]
struct Cli {
    #[arg(long, env = "FREDDY_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "FREDDY_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Threads(ThreadsCommand),
    /// Print the current thread, or `--thread`, with messages grouped.
    History {
        #[arg(long)]
        thread: Option<String>,
    },
    /// Send one message and stream the reply.
    Send {
        message: String,
    },
    /// Interactive chat on the current thread. `/quit` exits.
    Chat,
    /// Show the user session, launched agents and monthly usage.
    Session,
    Agent(AgentCommand),
}

#[derive(Args, Debug)]
struct ThreadsCommand {
    #[command(subcommand)]
    command: ThreadsSubcommand,
}

#[derive(Subcommand, Debug)]
enum ThreadsSubcommand {
    List,
    Create {
        #[arg(long, default_value = "New Chat")]
        title: String,
        #[arg(long, default_value = DEFAULT_THREAD_ICON)]
        icon: String,
    },
    Select {
        thread_id: String,
    },
    Delete {
        thread_id: String,
    },
}

#[derive(Args, Debug)]
struct AgentCommand {
    #[command(subcommand)]
    command: AgentSubcommand,
}

#[derive(Subcommand, Debug)]
enum AgentSubcommand {
    Launch {
        agent_id: i64,
    },
    RecordUsage {
        agent_id: i64,
        #[arg(long)]
        tokens: u64,
        #[arg(long, default_value_t = 1)]
        messages: u64,
    },
}

type Session = ChatSession<HttpBackend>;

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let mut config = ChatConfig::from_env()?;
    if let Some(base_url) = cli.base_url.as_deref() {
        config.base_url = normalize_base_url(base_url)?;
    }
    if cli.auth_token.is_some() {
        config.auth_token = cli.auth_token;
    }

    let backend = HttpBackend::new(&config)?;
    let mut session = ChatSession::new(backend, &config);
    session.init().await?;

    match cli.command {
        Command::Threads(threads) => run_threads(&mut session, threads).await,
        Command::History { thread } => run_history(&mut session, thread.as_deref()).await,
        Command::Send { message } => run_send(&mut session, &message).await,
        Command::Chat => run_chat(&mut session).await,
        Command::Session => run_session(&session),
        Command::Agent(agent) => run_agent(&mut session, agent).await,
    }
}

async fn run_threads(session: &mut Session, threads: ThreadsCommand) -> Result<(), CliError> {
    match threads.command {
        ThreadsSubcommand::List => {
            print_threads(session);
            Ok(())
        }
        ThreadsSubcommand::Create { title, icon } => {
            let thread_id = session.new_thread(&title, &icon).await?;
            println!("{thread_id}");
            Ok(())
        }
        ThreadsSubcommand::Select { thread_id } => {
            session.select_thread(&thread_id).await?;
            print_transcript(session);
            Ok(())
        }
        ThreadsSubcommand::Delete { thread_id } => {
            session.delete_thread(&thread_id).await?;
            println!("deleted {thread_id}");
            Ok(())
        }
    }
}

async fn run_history(session: &mut Session, thread: Option<&str>) -> Result<(), CliError> {
    if let Some(thread_id) = thread {
        session.select_thread(thread_id).await?;
    }
    print_transcript(session);
    Ok(())
}

async fn run_send(session: &mut Session, message: &str) -> Result<(), CliError> {
    match session.send_message_observed(message, print_event).await? {
        TurnOutcome::Ignored => eprintln!("nothing to send"),
        TurnOutcome::Completed { .. } => println!(),
    }
    Ok(())
}

async fn run_chat(session: &mut Session) -> Result<(), CliError> {
    print_transcript(session);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        if line.trim() == "/quit" {
            return Ok(());
        }

        if let Err(e) = session.refresh_if_due().await {
            tracing::warn!(error = %e, "periodic refresh failed");
        }
        match session.send_message_observed(&line, print_event).await {
            Ok(_) => println!(),
            Err(e) if e.retryable() => eprintln!("\nerror: {e} (send again to retry)"),
            Err(e) => eprintln!("\nerror: {e}"),
        }
    }
}

fn run_session(session: &Session) -> Result<(), CliError> {
    let user = session.user_session().ok_or(CliError::NoSession)?;
    let since = user.created_date.as_deref().unwrap_or("-");
    println!("session {} (since {since})", user.session_id);

    for agent in &user.session_agents {
        let marker = if agent.is_current_agent { "*" } else { " " };
        println!(
            "{marker} {} {} [{}] {}",
            agent.agent_icon, agent.agent_name, agent.agent_id, agent.agent_code
        );
    }

    let usage = user.usage_statistics;
    let (tokens, messages, threads) = usage.formatted();
    let limits = usage.limits();
    println!("tokens this month:   {tokens}{}", limit_marker(limits.tokens));
    println!("messages this month: {messages}{}", limit_marker(limits.messages));
    println!("threads this month:  {threads}{}", limit_marker(limits.threads));
    Ok(())
}

async fn run_agent(session: &mut Session, agent: AgentCommand) -> Result<(), CliError> {
    match agent.command {
        AgentSubcommand::Launch { agent_id } => {
            session.launch_agent(agent_id).await?;
            run_session(session)
        }
        AgentSubcommand::RecordUsage { agent_id, tokens, messages } => {
            let record = UsageRecord { agent_id, tokens_used: tokens, message_count: messages };
            session.record_usage(record).await?;
            run_session(session)
        }
    }
}

fn print_event(event: &StreamEvent, applied: &Applied) {
    let StreamEvent::Message { agent_code, content, .. } = event else {
        return;
    };
    match applied {
        Applied::Started | Applied::HandedOff => print!("\n[{agent_code}] {content}"),
        Applied::Extended => print!("{content}"),
        _ => return,
    }
    std::io::stdout().flush().ok();
}

fn print_threads(session: &Session) {
    let list = session.threads();
    if let Some(error) = &list.error {
        eprintln!("{error}");
    }
    let groups = group_by_activity(&list.threads, OffsetDateTime::now_utc());
    for (heading, threads) in groups.sections() {
        println!("{heading}");
        for thread in threads {
            let marker = if list.is_current(&thread.thread_id) { "*" } else { " " };
            println!(
                "{marker} {} {}  ({} messages)  {}",
                thread.icon_kind().glyph(),
                thread.title,
                thread.message_count,
                thread.thread_id
            );
        }
    }
}

fn print_transcript(session: &Session) {
    let messages = session.transcript().messages();
    if messages.is_empty() {
        println!("(no messages)");
        return;
    }

    for row in session.layout() {
        let message = &messages[row.index];
        if row.position.shows_header() {
            let sender = match row.side {
                Side::Right => "you".to_string(),
                Side::Left => {
                    let name = message.agent_name.as_deref().unwrap_or("assistant");
                    format!("{} {name}", session.icon_for(message))
                }
            };
            println!("\n[{sender}] {}", message.created_date.as_deref().unwrap_or_default());
        }
        println!("  {}", message.content);
    }
}

fn limit_marker(reached: bool) -> &'static str {
    if reached { "  (limit reached)" } else { "" }
}
