//! cbc-ctl: command-line interface for the CBC daemon.

mod cmd;

use anyhow::{Context, Result};

const DEFAULT_PORT: u16 = 12345;

fn print_usage() {
    println!("Usage: cbc-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                          Daemon status and live sessions");
    println!("  show peers                      List peers");
    println!("  show messages cbs               List active CBS messages");
    println!("  show messages etws              List active ETWS messages");
    println!("  show running-config             Print the live configuration");
    println!("  create <file.json>              Create or replace a message");
    println!("  delete <message-id>             Delete a message (decimal or 0x hex)");
    println!("  peer add <name> <ip> [<port>]   Add a peer");
    println!("  peer remove <name>              Remove a peer");
    println!("  unknown-peers <accept|reject>   Set the unknown-peer policy");
    println!("  config write                    Persist peers and policy");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => cmd::peers::cmd_status(port).await,
        ["show", "peers"] => cmd::peers::cmd_show_peers(port).await,
        ["show", "messages", "cbs"] => cmd::messages::cmd_show_cbs(port).await,
        ["show", "messages", "etws"] => cmd::messages::cmd_show_etws(port).await,
        ["show", "running-config"] => cmd::config::cmd_show_running_config(port).await,
        ["create", file] => cmd::messages::cmd_create(port, file).await,
        ["delete", id] => cmd::messages::cmd_delete(port, id).await,
        ["peer", "add", name, ip] => cmd::peers::cmd_peer_add(port, name, ip, None).await,
        ["peer", "add", name, ip, p] => cmd::peers::cmd_peer_add(port, name, ip, Some(*p)).await,
        ["peer", "remove", name] => cmd::peers::cmd_peer_remove(port, name).await,
        ["unknown-peers", policy] => cmd::config::cmd_unknown_peers(port, policy).await,
        ["config", "write"] => cmd::config::cmd_config_write(port).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
