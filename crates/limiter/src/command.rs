//! The `popguard` administrative command.

use popguard_config::ConfigHandle;
use std::collections::BTreeSet;
use std::fmt;

pub const COMMAND_NAME: &str = "popguard";
pub const RELOAD_PERMISSION: &str = "popguard.reload";

/// Who issued a command.
#[derive(Debug, Clone)]
pub enum CommandSender {
    Console,
    Player {
        name: String,
        operator: bool,
        permissions: BTreeSet<String>,
    },
}

impl CommandSender {
    pub fn has_permission(&self, node: &str) -> bool {
        match self {
            Self::Console => true,
            Self::Player {
                operator,
                permissions,
                ..
            } => *operator || permissions.contains(node),
        }
    }
}

/// Result of a command, rendered as the message shown to the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    Reloaded { warnings: usize },
    ReloadFailed(String),
    Denied,
    Usage,
}

impl fmt::Display for CommandReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reloaded { warnings: 0 } => write!(f, "Configuration reloaded."),
            Self::Reloaded { warnings } => write!(
                f,
                "Configuration reloaded with {warnings} warning(s); see the log for details."
            ),
            Self::ReloadFailed(reason) => {
                write!(f, "Reload failed, keeping the previous configuration: {reason}")
            }
            Self::Denied => write!(f, "You do not have permission to use this command."),
            Self::Usage => write!(f, "Usage: /{COMMAND_NAME} reload"),
        }
    }
}

/// Execute `/popguard <args>`. Nothing changes unless the sender is allowed
/// and the arguments are exactly `reload`.
pub fn execute(config: &ConfigHandle, sender: &CommandSender, args: &[&str]) -> CommandReply {
    if !sender.has_permission(RELOAD_PERMISSION) {
        tracing::info!(?sender, "rejected unauthorized command");
        return CommandReply::Denied;
    }
    match args {
        [sub] if sub.eq_ignore_ascii_case("reload") => match config.reload() {
            Ok(report) => CommandReply::Reloaded {
                warnings: report.warnings.len(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "reload failed");
                CommandReply::ReloadFailed(e.to_string())
            }
        },
        _ => CommandReply::Usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(yaml: &str) -> (tempfile::TempDir, ConfigHandle) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, yaml).unwrap();
        let (handle, _) = ConfigHandle::open(&path).unwrap();
        (dir, handle)
    }

    fn player(operator: bool, permissions: &[&str]) -> CommandSender {
        CommandSender::Player {
            name: "alex".into(),
            operator,
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn console_can_reload() {
        let (dir, config) = handle("spawn_radius: 10\n");
        std::fs::write(dir.path().join("config.yml"), "spawn_radius: 20\n").unwrap();
        let reply = execute(&config, &CommandSender::Console, &["reload"]);
        assert_eq!(reply, CommandReply::Reloaded { warnings: 0 });
        assert_eq!(reply.to_string(), "Configuration reloaded.");
        assert_eq!(config.current().spawn_radius, 20.0);
    }

    #[test]
    fn unauthorized_player_changes_nothing() {
        let (dir, config) = handle("spawn_radius: 10\n");
        std::fs::write(dir.path().join("config.yml"), "spawn_radius: 20\n").unwrap();
        let reply = execute(&config, &player(false, &[]), &["reload"]);
        assert_eq!(reply, CommandReply::Denied);
        assert_eq!(config.current().spawn_radius, 10.0);
    }

    #[test]
    fn permission_or_operator_is_enough() {
        let (_dir, config) = handle("");
        assert!(matches!(
            execute(&config, &player(false, &[RELOAD_PERMISSION]), &["reload"]),
            CommandReply::Reloaded { .. }
        ));
        assert!(matches!(
            execute(&config, &player(true, &[]), &["RELOAD"]),
            CommandReply::Reloaded { .. }
        ));
    }

    #[test]
    fn bad_arguments_print_usage() {
        let (dir, config) = handle("spawn_radius: 10\n");
        std::fs::write(dir.path().join("config.yml"), "spawn_radius: 20\n").unwrap();
        for args in [&[][..], &["status"][..], &["reload", "now"][..]] {
            let reply = execute(&config, &CommandSender::Console, args);
            assert_eq!(reply, CommandReply::Usage);
            assert_eq!(reply.to_string(), "Usage: /popguard reload");
        }
        assert_eq!(config.current().spawn_radius, 10.0);
    }

    #[test]
    fn reload_warnings_are_counted() {
        let (dir, config) = handle("");
        std::fs::write(
            dir.path().join("config.yml"),
            "entity_limits:\n  unicorn: 3\n",
        )
        .unwrap();
        assert_eq!(
            execute(&config, &CommandSender::Console, &["reload"]),
            CommandReply::Reloaded { warnings: 1 }
        );
    }

    #[test]
    fn broken_file_reports_failure_and_keeps_snapshot() {
        let (dir, config) = handle("spawn_radius: 10\n");
        std::fs::write(dir.path().join("config.yml"), "spawn_radius: [").unwrap();
        let reply = execute(&config, &CommandSender::Console, &["reload"]);
        assert!(matches!(reply, CommandReply::ReloadFailed(_)));
        assert_eq!(config.current().spawn_radius, 10.0);
    }
}
