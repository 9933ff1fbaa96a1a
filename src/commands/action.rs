//! Known command actions and the parameter shape each one expects

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operations a model may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    // Files
    FileRead,
    FileWrite,
    FileAppend,
    FileDelete,
    FileCopy,
    FileMove,
    FileList,
    FileSearch,
    DirCreate,
    DirDelete,
    // Git
    GitClone,
    GitPull,
    GitPush,
    GitCommit,
    GitCheckout,
    GitBranch,
    GitMerge,
    GitStatus,
    GitDiff,
    GitLog,
    GitTag,
    // Shell and processes
    ShellExec,
    ShellScript,
    ProcessList,
    ProcessKill,
    // Network
    HttpGet,
    HttpPost,
    HttpPut,
    HttpDelete,
    HttpRequest,
    DownloadFile,
    WebhookSend,
    Ping,
    // Databases
    DbQuery,
    DbExecute,
    DbMigrate,
    DbBackup,
    DbRestore,
    // Containers
    DockerBuild,
    DockerRun,
    DockerStop,
    DockerPull,
    DockerPush,
    DockerLogs,
    DockerComposeUp,
    DockerComposeDown,
    // Build tooling
    NpmInstall,
    NpmRun,
    PipInstall,
    CargoBuild,
    CargoTest,
    MakeRun,
    // System
    EnvGet,
    EnvSet,
    ServiceStart,
    ServiceStop,
    ServiceRestart,
    SystemInfo,
    DiskUsage,
    // Messaging
    MessageSend,
    MessageReply,
    NotifyUser,
    EmailSend,
    // Workflow
    AskUser,
    Wait,
    ScheduleTask,
    CancelTask,
    ReportStatus,
    SearchWeb,
    SummarizeText,
    GenerateCode,
    ReviewCode,
    RunTests,
}

/// Expected parameter layout for an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamShape {
    Path,
    FileWrite,
    Transfer,
    Search,
    Repository,
    GitWorkspace,
    GitBranch,
    GitCommit,
    GitTag,
    Shell,
    Process,
    Http,
    Download,
    Host,
    Query,
    DatabaseAdmin,
    Image,
    Container,
    Compose,
    Packages,
    Script,
    Workspace,
    EnvVar,
    Service,
    Message,
    Email,
    Question,
    Wait,
    Schedule,
    Task,
    Text,
    CodeGen,
    Empty,
}

impl ParamShape {
    /// Parameters that must be present
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Path => &["path"],
            Self::FileWrite => &["path", "content"],
            Self::Transfer => &["source", "destination"],
            Self::Search => &["query"],
            Self::Repository => &["url"],
            Self::GitWorkspace => &[],
            Self::GitBranch => &["branch"],
            Self::GitCommit => &["message"],
            Self::GitTag => &["name"],
            Self::Shell => &["command"],
            Self::Process => &["pid"],
            Self::Http => &["url"],
            Self::Download => &["url", "destination"],
            Self::Host => &["host"],
            Self::Query => &["query"],
            Self::DatabaseAdmin => &["database"],
            Self::Image => &["image"],
            Self::Container => &["container"],
            Self::Compose => &[],
            Self::Packages => &["packages"],
            Self::Script => &["script"],
            Self::Workspace => &[],
            Self::EnvVar => &["name"],
            Self::Service => &["name"],
            Self::Message => &["content"],
            Self::Email => &["to", "subject", "body"],
            Self::Question => &["question"],
            Self::Wait => &["durationMs"],
            Self::Schedule => &["action", "at"],
            Self::Task => &["taskId"],
            Self::Text => &["text"],
            Self::CodeGen => &["description"],
            Self::Empty => &[],
        }
    }

    /// Parameters holding URLs
    pub fn url_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Repository | Self::Http | Self::Download => &["url"],
            Self::GitWorkspace => &["remote"],
            _ => &[],
        }
    }

    /// Parameters holding filesystem paths
    pub fn path_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Path | Self::FileWrite => &["path"],
            Self::Transfer => &["source", "destination"],
            Self::Search => &["path"],
            Self::Repository => &["directory"],
            Self::GitWorkspace | Self::GitBranch | Self::GitCommit | Self::GitTag => &["repository"],
            Self::Shell | Self::Packages | Self::Script | Self::Workspace => &["cwd"],
            Self::Download => &["destination"],
            Self::DatabaseAdmin => &["path"],
            Self::Image => &["context"],
            Self::Compose => &["file"],
            _ => &[],
        }
    }
}

/// Action name and parameter shape for every known action
pub const ACTION_TABLE: &[(Action, &str, ParamShape)] = &[
    (Action::FileRead, "file_read", ParamShape::Path),
    (Action::FileWrite, "file_write", ParamShape::FileWrite),
    (Action::FileAppend, "file_append", ParamShape::FileWrite),
    (Action::FileDelete, "file_delete", ParamShape::Path),
    (Action::FileCopy, "file_copy", ParamShape::Transfer),
    (Action::FileMove, "file_move", ParamShape::Transfer),
    (Action::FileList, "file_list", ParamShape::Path),
    (Action::FileSearch, "file_search", ParamShape::Search),
    (Action::DirCreate, "dir_create", ParamShape::Path),
    (Action::DirDelete, "dir_delete", ParamShape::Path),
    (Action::GitClone, "git_clone", ParamShape::Repository),
    (Action::GitPull, "git_pull", ParamShape::GitWorkspace),
    (Action::GitPush, "git_push", ParamShape::GitWorkspace),
    (Action::GitCommit, "git_commit", ParamShape::GitCommit),
    (Action::GitCheckout, "git_checkout", ParamShape::GitBranch),
    (Action::GitBranch, "git_branch", ParamShape::GitBranch),
    (Action::GitMerge, "git_merge", ParamShape::GitBranch),
    (Action::GitStatus, "git_status", ParamShape::GitWorkspace),
    (Action::GitDiff, "git_diff", ParamShape::GitWorkspace),
    (Action::GitLog, "git_log", ParamShape::GitWorkspace),
    (Action::GitTag, "git_tag", ParamShape::GitTag),
    (Action::ShellExec, "shell_exec", ParamShape::Shell),
    (Action::ShellScript, "shell_script", ParamShape::Shell),
    (Action::ProcessList, "process_list", ParamShape::Empty),
    (Action::ProcessKill, "process_kill", ParamShape::Process),
    (Action::HttpGet, "http_get", ParamShape::Http),
    (Action::HttpPost, "http_post", ParamShape::Http),
    (Action::HttpPut, "http_put", ParamShape::Http),
    (Action::HttpDelete, "http_delete", ParamShape::Http),
    (Action::HttpRequest, "http_request", ParamShape::Http),
    (Action::DownloadFile, "download_file", ParamShape::Download),
    (Action::WebhookSend, "webhook_send", ParamShape::Http),
    (Action::Ping, "ping", ParamShape::Host),
    (Action::DbQuery, "db_query", ParamShape::Query),
    (Action::DbExecute, "db_execute", ParamShape::Query),
    (Action::DbMigrate, "db_migrate", ParamShape::DatabaseAdmin),
    (Action::DbBackup, "db_backup", ParamShape::DatabaseAdmin),
    (Action::DbRestore, "db_restore", ParamShape::DatabaseAdmin),
    (Action::DockerBuild, "docker_build", ParamShape::Image),
    (Action::DockerRun, "docker_run", ParamShape::Image),
    (Action::DockerStop, "docker_stop", ParamShape::Container),
    (Action::DockerPull, "docker_pull", ParamShape::Image),
    (Action::DockerPush, "docker_push", ParamShape::Image),
    (Action::DockerLogs, "docker_logs", ParamShape::Container),
    (Action::DockerComposeUp, "docker_compose_up", ParamShape::Compose),
    (Action::DockerComposeDown, "docker_compose_down", ParamShape::Compose),
    (Action::NpmInstall, "npm_install", ParamShape::Packages),
    (Action::NpmRun, "npm_run", ParamShape::Script),
    (Action::PipInstall, "pip_install", ParamShape::Packages),
    (Action::CargoBuild, "cargo_build", ParamShape::Workspace),
    (Action::CargoTest, "cargo_test", ParamShape::Workspace),
    (Action::MakeRun, "make_run", ParamShape::Script),
    (Action::EnvGet, "env_get", ParamShape::EnvVar),
    (Action::EnvSet, "env_set", ParamShape::EnvVar),
    (Action::ServiceStart, "service_start", ParamShape::Service),
    (Action::ServiceStop, "service_stop", ParamShape::Service),
    (Action::ServiceRestart, "service_restart", ParamShape::Service),
    (Action::SystemInfo, "system_info", ParamShape::Empty),
    (Action::DiskUsage, "disk_usage", ParamShape::Empty),
    (Action::MessageSend, "message_send", ParamShape::Message),
    (Action::MessageReply, "message_reply", ParamShape::Message),
    (Action::NotifyUser, "notify_user", ParamShape::Message),
    (Action::EmailSend, "email_send", ParamShape::Email),
    (Action::AskUser, "ask_user", ParamShape::Question),
    (Action::Wait, "wait", ParamShape::Wait),
    (Action::ScheduleTask, "schedule_task", ParamShape::Schedule),
    (Action::CancelTask, "cancel_task", ParamShape::Task),
    (Action::ReportStatus, "report_status", ParamShape::Text),
    (Action::SearchWeb, "search_web", ParamShape::Search),
    (Action::SummarizeText, "summarize_text", ParamShape::Text),
    (Action::GenerateCode, "generate_code", ParamShape::CodeGen),
    (Action::ReviewCode, "review_code", ParamShape::Path),
    (Action::RunTests, "run_tests", ParamShape::Workspace),
];

impl Action {
    pub fn all() -> impl Iterator<Item = Action> {
        ACTION_TABLE.iter().map(|(action, _, _)| *action)
    }

    pub fn as_str(&self) -> &'static str {
        ACTION_TABLE
            .iter()
            .find(|(action, _, _)| action == self)
            .map(|(_, name, _)| *name)
            .unwrap_or("unknown")
    }

    pub fn shape(&self) -> ParamShape {
        ACTION_TABLE
            .iter()
            .find(|(action, _, _)| action == self)
            .map(|(_, _, shape)| *shape)
            .unwrap_or(ParamShape::Empty)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ACTION_TABLE
            .iter()
            .find(|(_, name, _)| *name == s)
            .map(|(action, _, _)| *action)
            .ok_or_else(|| format!("unknown action: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_names_match_serde() {
        for (action, name, _) in ACTION_TABLE {
            let serialized = serde_json::to_value(action).unwrap();
            assert_eq!(serialized, serde_json::Value::String(name.to_string()));
        }
    }

    #[test]
    fn test_table_has_no_duplicates() {
        let names: HashSet<_> = ACTION_TABLE.iter().map(|(_, name, _)| *name).collect();
        assert_eq!(names.len(), ACTION_TABLE.len());
        assert!(ACTION_TABLE.len() >= 70);
    }

    #[test]
    fn test_parse_known_and_unknown() {
        assert_eq!("shell_exec".parse::<Action>().unwrap(), Action::ShellExec);
        assert_eq!(Action::GitClone.shape(), ParamShape::Repository);
        assert!("format_disk".parse::<Action>().is_err());
    }

    #[test]
    fn test_shape_field_lists() {
        assert_eq!(ParamShape::Shell.required_fields(), &["command"]);
        assert_eq!(ParamShape::Repository.url_fields(), &["url"]);
        assert!(ParamShape::Transfer.path_fields().contains(&"destination"));
        assert!(ParamShape::Empty.required_fields().is_empty());
    }
}
