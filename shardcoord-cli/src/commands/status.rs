//! `shardcoord status`: print the shared status list

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;

use shardcoord_config::ShardcoordConfig;
use shardcoord_ipc::{ChannelNames, ConnectionState, ShardState};
use shardcoord_storage::ShardStatsRepository;

pub async fn status_command(config: &ShardcoordConfig, format: &str) -> Result<()> {
    let store = shardcoord_storage::connect(&config.store)
        .await
        .context("Failed to connect to the coordination store")?;
    let repo = ShardStatsRepository::new(store, &ChannelNames::new(&config.store.key_prefix));
    let states = repo
        .read_all()
        .await
        .context("Failed to read shard records")?;

    match format.to_lowercase().as_str() {
        "table" => print!("{}", render_table(&states, Utc::now())),
        "json" => println!(
            "{}",
            serde_json::to_string_pretty(&states).context("Failed to serialize shard records")?
        ),
        _ => bail!("Unknown output format: {}. Valid formats: table, json", format),
    }
    Ok(())
}

fn render_table(states: &[ShardState], now: DateTime<Utc>) -> String {
    if states.is_empty() {
        return "No shard records found; is the coordinator running?\n".to_string();
    }

    let mut out = format!("{:>5}  {:<14} {:>8}  {}\n", "SHARD", "STATE", "GUILDS", "LAST REPORT");
    let mut guilds = 0;
    for state in states {
        guilds += state.guild_count;
        let label = format!("{:<14}", state.connection_state.to_string());
        let label = match state.connection_state {
            ConnectionState::Connected => label.green(),
            ConnectionState::Disconnected | ConnectionState::Disconnecting => label.red(),
            _ => label.yellow(),
        };
        out.push_str(&format!(
            "{:>5}  {} {:>8}  {}\n",
            state.shard_id,
            label,
            state.guild_count,
            describe_age(state.last_report_time, now)
        ));
    }
    out.push_str(&format!("{} shards, {} guilds\n", states.len(), guilds));
    out
}

/// Placeholders are stamped in the future while a shard waits for its turn
fn describe_age(last_report: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = (now - last_report).num_seconds();
    if age >= 0 {
        format!("{}s ago", age)
    } else {
        format!("grace for {}s", -age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_age() {
        let now = Utc::now();
        assert_eq!(describe_age(now - chrono::Duration::seconds(12), now), "12s ago");
        assert_eq!(describe_age(now + chrono::Duration::seconds(40), now), "grace for 40s");
    }

    #[test]
    fn test_render_table() {
        colored::control::set_override(false);
        let now = Utc::now();
        let states = vec![
            ShardState {
                shard_id: 0,
                connection_state: ConnectionState::Connected,
                guild_count: 1000,
                last_report_time: now - chrono::Duration::seconds(3),
            },
            ShardState::placeholder(1, now + chrono::Duration::seconds(20)),
        ];

        let table = render_table(&states, now);
        assert!(table.contains("Connected"));
        assert!(table.contains("3s ago"));
        assert!(table.contains("grace for 20s"));
        assert!(table.ends_with("2 shards, 1000 guilds\n"));
    }

    #[test]
    fn test_render_empty() {
        assert!(render_table(&[], Utc::now()).contains("No shard records"));
    }
}
