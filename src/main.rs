use std::io::{BufRead, Write as _};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use prompt_assistant::approval::{
    ApprovalTracker, HttpApprovalClient, PendingCountPoller, ResolveOutcome,
};
use prompt_assistant::config::Settings;
use prompt_assistant::llm::{LLMProvider, OllamaClient};
use prompt_assistant::prompts;
use prompt_assistant::session::{ChatSession, SegmentSink, TurnOutcome};
use prompt_assistant::streaming::{Segment, SegmentKind, TokenizerLimits};

#[derive(Parser, Debug)]
#[command(about = "Chat with a local model, with approval-gated tool actions")]
struct Args {
    /// Model name (overrides OLLAMA_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Ollama base URL (overrides OLLAMA_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Approval service base URL (overrides APPROVAL_BASE_URL)
    #[arg(long)]
    approval_url: Option<String>,

    /// System prompt preset
    #[arg(long)]
    preset: Option<String>,
}

/// Prints the final rendering of each turn and announces new approval
/// requests as they appear in the stream.
struct CliSink;

impl SegmentSink for CliSink {
    fn on_segments(&self, _segments: &[Segment]) {
        // Intermediate flushes are dropped; the full turn is rendered once
        // it completes.
    }

    fn on_pending(&self, action: &prompt_assistant::approval::PendingAction) {
        println!(
            "\n[approval required] {} {} (id: {}) - /approve or /deny",
            action.tool, action.action, action.request_id
        );
    }
}

fn render(outcome: &TurnOutcome) {
    for segment in &outcome.segments {
        match segment.kind {
            SegmentKind::Text => println!("{}", segment.content),
            SegmentKind::Thought => println!("(thinking) {}", segment.content),
            SegmentKind::Tool => match segment.tool_invocation() {
                Some(invocation) => {
                    let args: Vec<String> = invocation
                        .arguments
                        .iter()
                        .map(|(k, v)| format!("{k}={v}"))
                        .collect();
                    println!("[tool call] {} {}", invocation.name, args.join(" "));
                }
                None => println!("[tool call] {}", segment.content),
            },
            SegmentKind::Pending => {}
        }
    }
    if outcome.cancelled {
        println!("[stopped]");
    }
}

async fn run_turn(
    session: &mut ChatSession,
    provider: &dyn LLMProvider,
    sink: Arc<dyn SegmentSink>,
    tracker: &ApprovalTracker,
    prompt: String,
) {
    match session.send_turn(provider, sink, prompt).await {
        Ok(outcome) => {
            for action in &outcome.pending {
                tracker.register(action.clone());
            }
            render(&outcome);
        }
        Err(e) => error!("Turn failed: {e:#}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let mut settings = Settings::from_env();
    if let Some(model) = args.model {
        settings.model = model;
    }
    if let Some(base_url) = args.base_url {
        settings.base_url = base_url;
    }
    if let Some(approval_url) = args.approval_url {
        settings.approval_base_url = approval_url;
    }
    if let Some(preset) = args.preset {
        settings.system_preset = preset;
    }

    let base = prompts::preset(&settings.system_preset).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown preset '{}'; available: {}",
            settings.system_preset,
            prompts::preset_names().join(", ")
        )
    })?;
    let system_prompt = prompts::assemble_system_prompt(base);

    let provider = OllamaClient::new(settings.model.clone(), settings.base_url.clone());
    let mut session = ChatSession::new(system_prompt, settings.options.clone()).with_limits(
        TokenizerLimits::default(),
        Duration::from_millis(settings.flush_interval_ms),
    );

    let approval_client = Arc::new(HttpApprovalClient::new(settings.approval_base_url.clone()));
    let tracker = ApprovalTracker::new(approval_client.clone());
    let poller = PendingCountPoller::start(
        approval_client,
        Duration::from_secs(settings.poll_interval_secs),
    );

    let sink: Arc<dyn SegmentSink> = Arc::new(CliSink);

    println!(
        "Chatting with {} ({}). /approve ID, /deny ID, /pending, /delete N, /quit",
        settings.model, settings.base_url
    );

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit" | "/exit", _) => break,
            ("/pending", _) => {
                let unresolved = tracker.unresolved();
                if unresolved.is_empty() {
                    println!("No unresolved actions ({} queued server-side)", poller.latest());
                }
                for action in unresolved {
                    println!(
                        "{}: {} {} params={}",
                        action.request_id, action.tool, action.action, action.params
                    );
                }
            }
            ("/approve", id) if !id.is_empty() => {
                match tracker.approve(id.trim()).await {
                    Ok(ResolveOutcome::Resolved(follow_up)) => {
                        run_turn(&mut session, &provider, sink.clone(), &tracker, follow_up.prompt)
                            .await;
                    }
                    Ok(other) => println!("{other:?}"),
                    Err(e) => error!("Approve failed: {e:#}"),
                }
            }
            ("/deny", id) if !id.is_empty() => {
                match tracker.deny(id.trim()).await {
                    Ok(ResolveOutcome::Resolved(follow_up)) => {
                        run_turn(&mut session, &provider, sink.clone(), &tracker, follow_up.prompt)
                            .await;
                    }
                    Ok(other) => println!("{other:?}"),
                    Err(e) => error!("Deny failed: {e:#}"),
                }
            }
            ("/delete", index) if !index.is_empty() => match index.trim().parse::<usize>() {
                Ok(index) => match session.delete_message(index) {
                    Ok(removed) => println!("Removed message {index} ({:?})", removed.role),
                    Err(e) => println!("{e}"),
                },
                Err(_) => println!("Usage: /delete N"),
            },
            _ => {
                run_turn(
                    &mut session,
                    &provider,
                    sink.clone(),
                    &tracker,
                    line.to_string(),
                )
                .await;
            }
        }
    }

    poller.stop();
    Ok(())
}
