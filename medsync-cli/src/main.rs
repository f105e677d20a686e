//! medsync-cli: terminal client for the MedSync HTTP API
//!
//! # Subcommands
//! - `advise <feature> <text> [--language <lang>] [--json]`: run an advice feature
//! - `sessions [--open] [--json]`: list the ledger
//! - `dashboard`: show the dashboard as JSON
//! - `status`: show server health

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";
const USER_HEADER: &str = "x-user-id";

/// Section labels in the order the server parses them.
const SECTION_LABELS: [(&str, &str); 6] = [
    ("condition", "Likely Condition"),
    ("remedies", "Natural Remedies"),
    ("foods", "Healing Foods & Diet"),
    ("medications", "Recommended Medications"),
    ("treatment", "How to Take Treatment"),
    ("warning", "Important Warning"),
];

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "medsync-cli", version, about = "MedSync health assistant CLI")]
struct Cli {
    /// MedSync HTTP server URL (overrides MEDSYNC_HTTP_URL env var)
    #[arg(long, env = "MEDSYNC_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Caller user id (overrides MEDSYNC_USER_ID env var)
    #[arg(long, env = "MEDSYNC_USER_ID")]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ask for advice: symptom_analysis, health_coaching, translation,
    /// medication_check, term_explanation, report_summary
    Advise {
        feature: String,

        /// Free text for the feature
        text: String,

        /// Target language for translation
        #[arg(long)]
        language: Option<String>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// List advice sessions, newest first
    Sessions {
        /// Only sessions that never closed
        #[arg(long)]
        open: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show the caller's dashboard
    Dashboard,

    /// Show MedSync server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AdviceResponse {
    pub session_id: String,
    pub feature: String,
    pub text: String,
    #[serde(default)]
    pub sections: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub fallback: bool,
    pub took_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub agent_type: String,
    pub input_text: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct SessionsResponse {
    pub count: usize,
    pub sessions: Vec<SessionSummary>,
}

// ============================================================================
// Rendering
// ============================================================================

/// Human-readable advice. Symptom analysis prints its non-empty sections;
/// everything else prints the text as-is.
pub fn render_advice(resp: &AdviceResponse) -> String {
    let mut out = String::new();
    match &resp.sections {
        Some(sections) => {
            for (key, label) in SECTION_LABELS {
                let body = sections
                    .get(key)
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .unwrap_or("");
                if body.is_empty() {
                    continue;
                }
                out.push_str(&format!("== {} ==\n{}\n\n", label, body));
            }
            if out.is_empty() {
                out.push_str(resp.text.trim());
                out.push('\n');
            }
        }
        None => {
            out.push_str(resp.text.trim());
            out.push('\n');
        }
    }
    if resp.fallback {
        out.push_str("\n(advice service unavailable, showing fallback guidance)\n");
    }
    out
}

/// One ledger line: timestamp, agent, state and a 50-char input preview.
pub fn session_line(s: &SessionSummary) -> String {
    let state = if s.ended_at.is_none() {
        "open"
    } else if s.metadata.get("error").is_some() {
        "error"
    } else {
        "done"
    };
    let mut preview: String = s.input_text.chars().take(50).collect();
    if s.input_text.chars().count() > 50 {
        preview.push('…');
    }
    let started: String = s.started_at.chars().take(19).collect();
    format!("{}  {:<16} {:<5}  {}", started, s.agent_type, state, preview)
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

fn require_user(user: Option<&str>) -> String {
    match user.map(str::trim).filter(|u| !u.is_empty()) {
        Some(u) => u.to_string(),
        None => {
            eprintln!("medsync-cli: --user or MEDSYNC_USER_ID is required");
            std::process::exit(1);
        }
    }
}

/// Send a request, exiting on connection failure or a non-success status.
fn send(req: reqwest::blocking::RequestBuilder, url: &str) -> reqwest::blocking::Response {
    let resp = match req.send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("medsync-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("medsync-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }
    resp
}

fn do_advise(
    server: &str,
    user: &str,
    feature: &str,
    text: &str,
    language: Option<String>,
    json_output: bool,
) -> anyhow::Result<()> {
    // Longer than the server's default 60s inference timeout.
    let client = client(90)?;
    let url = format!("{}/advice/{}", server, feature);
    let body = serde_json::json!({
        "input": text,
        "target_language": language,
    });

    let resp = send(client.post(&url).header(USER_HEADER, user).json(&body), &url);
    let value: serde_json::Value = resp.json()?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let advice: AdviceResponse = serde_json::from_value(value)?;
    print!("{}", render_advice(&advice));
    if let Some(ms) = advice.took_ms {
        eprintln!("[{} · {} ms · session {}]", advice.feature, ms, advice.session_id);
    }
    Ok(())
}

fn do_sessions(server: &str, user: &str, open: bool, json_output: bool) -> anyhow::Result<()> {
    let client = client(10)?;
    let url = format!("{}/sessions?open={}", server, open);
    let resp = send(client.get(&url).header(USER_HEADER, user), &url);
    let value: serde_json::Value = resp.json()?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let list: SessionsResponse = serde_json::from_value(value)?;
    if list.count == 0 {
        eprintln!("No sessions recorded");
        return Ok(());
    }
    for s in &list.sessions {
        println!("{}", session_line(s));
    }
    Ok(())
}

fn do_dashboard(server: &str, user: &str) -> anyhow::Result<()> {
    let client = client(10)?;
    let url = format!("{}/dashboard", server);
    let resp = send(client.get(&url).header(USER_HEADER, user), &url);
    let value: serde_json::Value = resp.json()?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = client(10)?;
    let url = format!("{}/health", server);

    match client.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("MedSync server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:        {}", body["version"].as_str().unwrap_or("?"));
            println!("Store:          {}", body["store"].as_str().unwrap_or("?"));
            println!("Inference:      {}", body["inference"].as_str().unwrap_or("?"));
            println!("Socket:         {}", body["socket"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            eprintln!("medsync-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("medsync-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();
    let user = cli.user.as_deref();

    let result = match cli.command {
        Commands::Advise {
            feature,
            text,
            language,
            json,
        } => do_advise(&server, &require_user(user), &feature, &text, language, json),
        Commands::Sessions { open, json } => do_sessions(&server, &require_user(user), open, json),
        Commands::Dashboard => do_dashboard(&server, &require_user(user)),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("medsync-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
