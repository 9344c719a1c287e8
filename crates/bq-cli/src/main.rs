//! bq-cli: MUD-style terminal client for the bridge gateway
//!
//! Usage: `bq-cli [name]`. Joins through the gateway, then forwards
//! each input line as a command and prints the acknowledgment.
//!
//! Configuration via environment:
//! - `BQ_GATEWAY_URL` gateway base URL, default http://localhost:4000

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

fn banner(name: &str, player_id: &str) {
    println!("==========================================");
    println!("  BROWSERQUEST // TERMINAL LINK ESTABLISHED");
    println!("==========================================");
    println!("  operator: {name}");
    println!("  playerId: {player_id}");
    println!("  type \"help\" for commands");
    println!();
}

fn print_help() {
    println!("Commands:");
    println!("  look / where     - show position");
    println!("  m|move <dir>     - move in a direction (n/s/e/w/up/down/left/right)");
    println!("  quit / exit      - disconnect");
}

#[tokio::main]
async fn main() -> Result<()> {
    let gateway = std::env::var("BQ_GATEWAY_URL")
        .unwrap_or_else(|_| "http://localhost:4000".to_string());
    let name = std::env::args().nth(1).unwrap_or_else(|| "wanderer".to_string());

    let http = reqwest::Client::new();
    let joined: Value = http
        .post(format!("{gateway}/join"))
        .json(&json!({ "name": name }))
        .send()
        .await
        .context("gateway unreachable")?
        .error_for_status()
        .context("join rejected")?
        .json()
        .await
        .context("malformed join response")?;

    let Some(player_id) = joined["playerId"].as_str().map(str::to_string) else {
        bail!("join response missing playerId: {joined}");
    };
    let Some(token) = joined["token"].as_str().map(str::to_string) else {
        bail!("join response missing token: {joined}");
    };

    banner(&name, &player_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "help" => {
                print_help();
                continue;
            }
            "quit" | "exit" => {
                let _ = http
                    .post(format!("{gateway}/leave"))
                    .json(&json!({ "playerId": player_id, "token": token }))
                    .send()
                    .await;
                println!("link closed");
                break;
            }
            _ => {}
        }

        let response = http
            .post(format!("{gateway}/command"))
            .json(&json!({ "playerId": player_id, "token": token, "command": input }))
            .send()
            .await;

        match response {
            Ok(resp) => {
                let body: Value = resp.json().await.unwrap_or(Value::Null);
                if let Some(output) = body["output"].as_str() {
                    println!("{output}");
                } else if let Some(error) = body["error"].as_str() {
                    println!("error: {error}");
                } else {
                    println!("{body}");
                }
            }
            Err(e) => println!("command failed: {e}"),
        }
    }

    Ok(())
}
