use crate::auth::{AuthPort, FirebaseAuth};
use crate::config::Config;
use crate::format::{DisplaySegment, MarkerKind, format_message};
use crate::message::ChatRole;
use crate::orchestrator::{IgnoreReason, Submission};
use crate::state::AppState;
use crate::store::HistoryStore;
use anyhow::{Context, Result, bail};
use crossterm::style::{Color, Stylize};
use dialoguer::{Input, Password};

/// One question, one formatted answer on stdout
pub async fn ask(state: &AppState, question: &str) -> Result<()> {
    let user = if state.history_enabled() {
        Some(state.require_user().await?)
    } else {
        None
    };

    let mut chat = state.orchestrator(state.completion_client()?);
    chat.set_user(user);

    match chat.submit(question) {
        Submission::Accepted => {}
        Submission::Ignored(IgnoreReason::EmptyInput) => bail!("The question is empty."),
        Submission::Ignored(reason) => bail!("Question not sent ({:?})", reason),
    }

    if let Some(reply) = chat.await_reply().await {
        print_segments(&format_message(&reply.content, false));
    }
    chat.flush_saves().await;
    Ok(())
}

pub fn print_segments(segments: &[DisplaySegment]) {
    for segment in segments {
        match segment {
            DisplaySegment::Paragraph(text) => println!("{}", text),
            DisplaySegment::Marker { kind, text } => {
                println!("{}", text.as_str().with(marker_color(*kind)));
            }
            DisplaySegment::ListItem(text) => println!("  {}", text),
            DisplaySegment::CodeBlock { language, lines } => {
                println!("{}", format!("┌─ {}", language).dark_grey());
                for line in lines {
                    println!("{} {}", "│".dark_grey(), line.as_str().white());
                }
                println!("{}", "└─".dark_grey());
            }
        }
    }
}

fn marker_color(kind: MarkerKind) -> Color {
    match kind {
        MarkerKind::Tip => Color::Blue,
        MarkerKind::Think => Color::Magenta,
        MarkerKind::Example => Color::Green,
        MarkerKind::Summary => Color::Yellow,
        MarkerKind::Step => Color::Cyan,
        MarkerKind::Warning => Color::Red,
    }
}

fn auth(state: &AppState) -> Result<&FirebaseAuth> {
    match &state.auth {
        Some(auth) => Ok(auth.as_ref()),
        None => bail!(
            "Cloud history is disabled. Enable [history] in {} to use accounts.",
            state.config.config_path().display()
        ),
    }
}

pub async fn login(state: &AppState, email: Option<String>, register: bool) -> Result<()> {
    let auth = auth(state)?;

    let email = match email {
        Some(email) => email,
        None => Input::<String>::new().with_prompt("E-mail").interact_text()?,
    };
    let mut prompt = Password::new().with_prompt("Password");
    if register {
        prompt = prompt.with_confirmation("Repeat password", "Passwords don't match");
    }
    let password = prompt.interact()?;

    let result = if register {
        auth.sign_up(&email, &password).await
    } else {
        auth.sign_in(&email, &password).await
    };
    let user = result?;

    if register {
        println!("🎉 Account created. Signed in as {}", user.label());
    } else {
        println!("✅ Signed in as {}", user.label());
    }
    Ok(())
}

pub async fn logout(state: &AppState) -> Result<()> {
    let auth = auth(state)?;
    auth.sign_out().await?;
    println!("👋 Signed out.");
    Ok(())
}

pub async fn whoami(state: &AppState) -> Result<()> {
    if !state.history_enabled() {
        println!("Cloud history is off; no account in use.");
        return Ok(());
    }

    match state.restore_user().await {
        Some(user) => {
            println!("👤 {}", user.label());
            println!("   e-mail: {}", user.email);
            println!("   uid:    {}", user.uid);
        }
        None => println!("Not signed in. Run 'studymate login' to sign in."),
    }
    Ok(())
}

pub async fn list_history(state: &AppState, limit: usize) -> Result<()> {
    let user = state.require_user().await?;
    let store = state.store.as_ref().context("history store unavailable")?;

    let mut messages = store.list_by_user(&user.uid).await?;
    if messages.is_empty() {
        println!("📭 No saved messages yet. Run 'studymate' to start a conversation!");
        return Ok(());
    }

    // Newest `limit` messages, printed oldest first
    messages.truncate(limit);
    messages.reverse();

    println!("📚 Saved conversation for {}:", user.label());
    println!("{}", "=".repeat(50));
    for message in messages {
        let who = match message.role {
            ChatRole::User => "👤",
            ChatRole::Assistant => "🤖",
        };
        println!(
            "{} {}  {}",
            who,
            message.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
            message.id.as_deref().unwrap_or("-").dark_grey()
        );
        println!("   {}", preview(&message.content, 72));
    }
    Ok(())
}

pub async fn delete_message(state: &AppState, id: &str) -> Result<()> {
    state.require_user().await?;
    let store = state.store.as_ref().context("history store unavailable")?;
    store
        .delete(id)
        .await
        .with_context(|| format!("Failed to delete message {}", id))?;
    println!("🗑️  Deleted message {}", id);
    Ok(())
}

pub fn show_config(config: &Config, init: bool) -> Result<()> {
    if init {
        if config.config_path().exists() {
            println!("Config already exists at {}", config.config_path().display());
        } else {
            Config {
                home: config.home.clone(),
                ..Config::default()
            }
            .save()?;
            println!("✨ Wrote default config to {}", config.config_path().display());
        }
        println!();
    }

    print!("{}", config.describe());
    Ok(())
}

/// First line of `content`, shortened to `max` chars
fn preview(content: &str, max: usize) -> String {
    let first = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if first.chars().count() <= max {
        first.to_string()
    } else {
        let cut: String = first.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
