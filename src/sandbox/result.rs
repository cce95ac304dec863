//! Results returned by sandbox operations.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
}

/// Outcome of a bash or editor call.
///
/// Command-level failures (blocked commands, nonzero exits, missing files)
/// are reported here instead of being raised, so they can be fed back to the
/// model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Success,
            output: output.into(),
            exit_code: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Error,
            output: String::new(),
            exit_code: None,
            error: Some(error.into()),
        }
    }

    /// Build from a process exit. Nonzero exits are errors with the output
    /// preserved.
    pub fn from_exit(exit_code: i64, output: String) -> Self {
        if exit_code == 0 {
            Self {
                exit_code: Some(0),
                ..Self::success(output)
            }
        } else {
            Self {
                status: ExecutionStatus::Error,
                output,
                exit_code: Some(exit_code),
                error: Some(format!("Command exited with status {}", exit_code)),
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// JSON payload handed back to the model as a tool result.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({ "status": "error", "error": format!("unserializable result: {}", e) })
        })
    }
}

/// Snapshot taken after provisioning, printed before the agent loop starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSetupInfo {
    pub user: String,
    pub uid: Option<u32>,
    pub is_non_root: bool,
    pub workspace_mounted: bool,
    pub working_directory: String,
}

impl ContainerSetupInfo {
    /// Parse the `key=value` lines printed by the verification script.
    pub(crate) fn parse(stdout: &str) -> Self {
        let mut info = Self {
            user: "unknown".to_string(),
            uid: None,
            is_non_root: false,
            workspace_mounted: false,
            working_directory: String::new(),
        };
        for line in stdout.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "user" if !value.is_empty() => info.user = value.to_string(),
                "uid" => info.uid = value.parse().ok(),
                "pwd" => info.working_directory = value.to_string(),
                "mounted" => info.workspace_mounted = value == "yes",
                _ => {}
            }
        }
        info.is_non_root = matches!(info.uid, Some(uid) if uid != 0);
        info
    }
}

impl fmt::Display for ContainerSetupInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "user:              {} (uid {})",
            self.user,
            self.uid.map(|u| u.to_string()).unwrap_or_else(|| "?".to_string())
        )?;
        writeln!(f, "non-root:          {}", self.is_non_root)?;
        writeln!(f, "workspace mounted: {}", self.workspace_mounted)?;
        write!(f, "working directory: {}", self.working_directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_nonzero_exit_is_error_with_output() {
        let result = ExecutionResult::from_exit(2, "partial".to_string());
        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.exit_code, Some(2));
        assert_eq!(result.output, "partial");
        assert!(result.error.is_some());
    }

    #[test]
    fn test_payload_uses_lowercase_status() {
        let payload = ExecutionResult::success("ok").to_payload();
        assert_eq!(payload["status"], "success");
        assert_eq!(payload["output"], "ok");
        assert!(payload.get("error").is_none());
    }

    #[test]
    fn test_setup_info_parse() {
        let info = ContainerSetupInfo::parse("user=agent\nuid=1000\npwd=/workspace\nmounted=yes\n");
        assert_eq!(
            info,
            ContainerSetupInfo {
                user: "agent".to_string(),
                uid: Some(1000),
                is_non_root: true,
                workspace_mounted: true,
                working_directory: "/workspace".to_string(),
            }
        );

        let root = ContainerSetupInfo::parse("user=root\nuid=0\npwd=/\nmounted=no\n");
        assert!(!root.is_non_root);
        assert!(!root.workspace_mounted);
    }
}
