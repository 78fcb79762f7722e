//! wanjiku-cli — USSD dial simulator and operator tooling for the Wanjiku gateway
//!
//! Talks to a running `wanjiku-server` over its HTTP API, so a menu walk can be
//! tried without a handset or the Africa's Talking sandbox.
//!
//! # Subcommands
//! - `dial [--phone <msisdn>]`                      — interactive USSD session
//! - `send <session> <text> [--phone <msisdn>]`     — one USSD turn
//! - `end <session>`                                — mark a session completed
//! - `sessions [-n <limit>] [--json]`               — recent sessions
//! - `sms <phone> <message>`                        — send an SMS
//! - `status`                                       — show server health

use std::io::{BufRead, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";
const DEFAULT_PHONE: &str = "+254700000000";
const DEFAULT_LIMIT: usize = 20;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "wanjiku-cli",
    version,
    about = "Wanjiku USSD simulator and operator tooling"
)]
struct Cli {
    /// Wanjiku HTTP server URL (overrides WANJIKU_HTTP_URL env var)
    #[arg(long, env = "WANJIKU_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start an interactive USSD session (type `q` to hang up)
    Dial {
        #[arg(long, default_value = DEFAULT_PHONE)]
        phone: String,
    },

    /// Send a single USSD input for an existing or new session
    Send {
        session_id: String,

        /// Menu selection or free text; empty shows the welcome menu
        #[arg(default_value = "")]
        text: String,

        #[arg(long, default_value = DEFAULT_PHONE)]
        phone: String,
    },

    /// End a USSD session
    End { session_id: String },

    /// List recent USSD sessions
    Sessions {
        #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Send an SMS through the gateway
    Sms { phone: String, message: String },

    /// Show Wanjiku server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

/// Reply from POST /ussd/sessions/process
#[derive(Debug, Deserialize)]
pub struct UssdTurn {
    pub success: bool,
    pub response: String,
    pub session_id: String,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub phone_number: String,
    pub status: String,
    pub current_step: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionList {
    pub count: usize,
    pub results: Vec<SessionSummary>,
}

// ============================================================================
// Helpers
// ============================================================================

/// Simulator session ids mimic the gateway's `ATUid_` prefix.
pub fn simulator_session_id(now: Duration) -> String {
    format!("ATUid_sim_{}", now.as_millis())
}

/// Inputs that hang up the simulated call.
pub fn is_hang_up(input: &str) -> bool {
    matches!(input.trim(), "q" | "quit" | "exit")
}

/// One table row per session, fixed-width so columns line up.
pub fn format_session_row(s: &SessionSummary) -> String {
    format!(
        "{:<28} {:<16} {:<10} {:<10} {}",
        s.session_id, s.phone_number, s.status, s.current_step, s.updated_at
    )
}

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// POST a JSON body and decode the reply, exiting on transport failure.
fn post_json<T: serde::de::DeserializeOwned>(
    server: &str,
    route: &str,
    body: serde_json::Value,
) -> anyhow::Result<T> {
    let url = format!("{}{}", server, route);
    let resp = match client(30)?.post(&url).json(&body).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("wanjiku-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if resp.status().is_server_error() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("wanjiku-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    Ok(resp.json()?)
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn ussd_turn(server: &str, session_id: &str, phone: &str, text: &str) -> anyhow::Result<UssdTurn> {
    post_json(
        server,
        "/ussd/sessions/process",
        serde_json::json!({
            "sessionId": session_id,
            "phoneNumber": phone,
            "text": text,
        }),
    )
}

fn do_dial(server: &str, phone: &str) -> anyhow::Result<()> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?;
    let session_id = simulator_session_id(now);
    eprintln!("Dialing as {} (session {}). Type q to hang up.\n", phone, session_id);

    let mut turn = ussd_turn(server, &session_id, phone, "")?;
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        println!("{}\n", turn.response);
        if let Some(e) = &turn.error {
            eprintln!("[server error: {}]", e);
        }

        print!("> ");
        std::io::stdout().flush()?;

        let input = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        if is_hang_up(&input) {
            break;
        }

        turn = ussd_turn(server, &session_id, phone, input.trim())?;
    }

    do_end(server, &session_id)
}

fn do_send(server: &str, session_id: &str, text: &str, phone: &str) -> anyhow::Result<()> {
    let turn = ussd_turn(server, session_id, phone, text)?;
    println!("{}", turn.response);
    if !turn.success {
        eprintln!(
            "wanjiku-cli: turn failed for {}: {}",
            turn.session_id,
            turn.error.unwrap_or_default()
        );
        std::process::exit(1);
    }
    Ok(())
}

fn do_end(server: &str, session_id: &str) -> anyhow::Result<()> {
    let body: serde_json::Value = post_json(
        server,
        "/ussd/sessions/end",
        serde_json::json!({ "sessionId": session_id }),
    )?;

    if body["success"] == true {
        println!("Session {} ended", session_id);
        Ok(())
    } else {
        anyhow::bail!(
            "could not end {}: {}",
            session_id,
            body["error"].as_str().unwrap_or("unknown error")
        )
    }
}

fn do_sessions(server: &str, limit: usize, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/ussd/sessions?limit={}", server, limit);
    let resp = client(10)?.get(&url).send()?;
    if !resp.status().is_success() {
        anyhow::bail!("server returned {}", resp.status());
    }

    if json_output {
        let body: serde_json::Value = resp.json()?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let list: SessionList = resp.json()?;
    if list.count == 0 {
        eprintln!("No sessions yet");
        return Ok(());
    }
    for s in &list.results {
        println!("{}", format_session_row(s));
    }
    Ok(())
}

fn do_sms(server: &str, phone: &str, message: &str) -> anyhow::Result<()> {
    let body: serde_json::Value = post_json(
        server,
        "/sms/send",
        serde_json::json!({ "phone_number": phone, "message": message }),
    )?;

    if body["success"] == true {
        println!(
            "Sent to {} ({})",
            phone,
            body["receipt"]["message_id"].as_str().unwrap_or("no receipt")
        );
        Ok(())
    } else {
        anyhow::bail!("SMS not sent: {}", body["error"].as_str().unwrap_or("unknown error"))
    }
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);

    match client(10)?.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Wanjiku server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:        {}", body["version"].as_str().unwrap_or("?"));
            println!("Storage:        {}", body["storage"].as_str().unwrap_or("?"));
            println!("Storage info:   {}", body["storage_version"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            eprintln!("wanjiku-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("wanjiku-cli: cannot reach {}: {}", url, e);
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

    let result = match cli.command {
        Commands::Dial { phone } => do_dial(&server, &phone),
        Commands::Send {
            session_id,
            text,
            phone,
        } => do_send(&server, &session_id, &text, &phone),
        Commands::End { session_id } => do_end(&server, &session_id),
        Commands::Sessions { limit, json } => do_sessions(&server, limit, json),
        Commands::Sms { phone, message } => do_sms(&server, &phone, &message),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("wanjiku-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulator_session_id_prefix() {
        let id = simulator_session_id(Duration::from_millis(1_760_000_000_123));
        assert_eq!(id, "ATUid_sim_1760000000123");
    }

    #[test]
    fn test_hang_up_inputs() {
        assert!(is_hang_up("q"));
        assert!(is_hang_up(" quit\n"));
        assert!(!is_hang_up("0"));
        assert!(!is_hang_up("quit smoking"));
    }

    #[test]
    fn test_parse_ussd_turn() {
        let json = r#"{"success":false,"response":"Samahani","session_id":"s1","error":"store down"}"#;
        let turn: UssdTurn = serde_json::from_str(json).unwrap();
        assert!(!turn.success);
        assert_eq!(turn.error.as_deref(), Some("store down"));

        let json = r#"{"success":true,"response":"Karibu","session_id":"s1"}"#;
        let turn: UssdTurn = serde_json::from_str(json).unwrap();
        assert!(turn.error.is_none());
    }

    #[test]
    fn test_parse_session_list_ignores_extra_fields() {
        let json = r#"{
            "count": 1,
            "results": [{
                "session_id": "ATUid_1",
                "phone_number": "+254712345678",
                "status": "active",
                "current_step": "services",
                "user_data": {},
                "created_at": "2026-10-19T08:00:00Z",
                "updated_at": "2026-10-19T08:01:00Z",
                "expires_at": "2026-10-19T08:06:00Z"
            }]
        }"#;
        let list: SessionList = serde_json::from_str(json).unwrap();
        assert_eq!(list.count, 1);

        let row = format_session_row(&list.results[0]);
        assert!(row.starts_with("ATUid_1 "));
        assert!(row.contains("services"));
        assert!(row.ends_with("2026-10-19T08:01:00Z"));
    }

    #[test]
    fn test_cli_parses_send_with_default_text() {
        let cli = Cli::try_parse_from(["wanjiku-cli", "send", "s1"]).unwrap();
        match cli.command {
            Commands::Send { session_id, text, phone } => {
                assert_eq!(session_id, "s1");
                assert_eq!(text, "");
                assert_eq!(phone, DEFAULT_PHONE);
            }
            other => panic!("Expected Send, got {:?}", other),
        }
    }
}
