use anyhow::Result;
use colored::Colorize;

use qbot_core::{Stage, Transcript};
use qbot_db::{Database, SessionFilter, SessionSummary};

pub fn handle_show(db: &Database, id: &str, json: bool) -> Result<()> {
    let Some(record) = db.sessions().get(id)? else {
        anyhow::bail!("Session not found: {}", id);
    };
    let transcript = record.conversation.transcript(&record.id);

    if json {
        println!("{}", serde_json::to_string_pretty(&transcript)?);
    } else {
        print_transcript_header(&transcript, record.conversation.stage());
        println!();
        print_transcript(&transcript);
    }
    Ok(())
}

pub fn handle_list(db: &Database, complete: bool, limit: Option<usize>, json: bool) -> Result<()> {
    let filter = SessionFilter {
        stage: complete.then_some(Stage::Complete),
        limit,
    };
    let summaries = db.sessions().list(&filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else if summaries.is_empty() {
        println!("{}", "No sessions found.".dimmed());
    } else {
        print_sessions_table(&summaries);
    }
    Ok(())
}

fn print_sessions_table(summaries: &[SessionSummary]) {
    println!(
        "{:<20} {:<26} {:<10} {}",
        "UPDATED".dimmed(),
        "STAGE".dimmed(),
        "Q/A".dimmed(),
        "SESSION".dimmed(),
    );

    for s in summaries {
        let updated = s.updated_at.format("%Y-%m-%d %H:%M").to_string();
        let progress = format!("{}/{}", s.question_count, s.answer_count);
        println!(
            "{:<20} {:<26} {:<10} {}",
            updated,
            colored_stage(s.stage),
            progress,
            s.id
        );
    }
}

fn print_transcript_header(transcript: &Transcript, stage: Stage) {
    println!("{}", "=== Session ===".bright_blue().bold());
    println!("{}  {}", "ID:".dimmed(), transcript.session_id);
    println!("{}  {}", "Stage:".dimmed(), colored_stage(stage));
    println!(
        "{}  {}",
        "Started:".dimmed(),
        transcript.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(completed) = transcript.completed_at {
        println!(
            "{}  {}",
            "Completed:".dimmed(),
            completed.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!(
        "{}  {} asked, {} answered",
        "Questions:".dimmed(),
        transcript.question_count,
        transcript.answer_count
    );
}

/// Numbered question/answer listing
pub fn print_transcript(transcript: &Transcript) {
    for pair in &transcript.items {
        println!(
            "{} {}",
            format!("[{}]", pair.number).bright_blue(),
            pair.question
        );
        match &pair.answer {
            Some(answer) => println!("    {}", answer),
            None => println!("    {}", "(no answer)".dimmed()),
        }
    }
}

fn colored_stage(stage: Stage) -> String {
    match stage {
        Stage::Complete => stage.as_str().bright_green().to_string(),
        Stage::AwaitingAnswer => stage.as_str().bright_cyan().to_string(),
        Stage::AwaitingFirstQuestion => stage.as_str().bright_yellow().to_string(),
    }
}
