//! Typed views of command parameters, one struct per [`ParamShape`]

use super::action::ParamShape;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathParams {
    pub path: String,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileWriteParams {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferParams {
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub query: String,
    pub path: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryParams {
    pub url: String,
    pub directory: Option<String>,
    pub branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitWorkspaceParams {
    pub repository: Option<String>,
    pub remote: Option<String>,
    pub branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitBranchParams {
    pub branch: String,
    pub repository: Option<String>,
    #[serde(default)]
    pub create: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitCommitParams {
    pub message: String,
    pub repository: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitTagParams {
    pub name: String,
    pub message: Option<String>,
    pub repository: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellParams {
    pub command: String,
    pub cwd: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessParams {
    pub pid: u32,
    pub signal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpParams {
    pub url: String,
    pub method: Option<String>,
    #[serde(default)]
    pub headers: Map<String, Value>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadParams {
    pub url: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostParams {
    pub host: String,
    pub count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    pub query: String,
    pub database: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseAdminParams {
    pub database: String,
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageParams {
    pub image: String,
    pub tag: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerParams {
    pub container: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeParams {
    pub file: Option<String>,
    #[serde(default)]
    pub services: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagesParams {
    pub packages: Vec<String>,
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptParams {
    pub script: String,
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceParams {
    pub cwd: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvVarParams {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceParams {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageParams {
    pub content: String,
    pub channel: Option<String>,
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailParams {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionParams {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitParams {
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleParams {
    pub action: String,
    pub at: String,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskParams {
    pub task_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextParams {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeGenParams {
    pub description: String,
    pub language: Option<String>,
}

/// Parameters decoded according to their action's shape
#[derive(Debug, Clone, PartialEq)]
pub enum CommandParameters {
    Path(PathParams),
    FileWrite(FileWriteParams),
    Transfer(TransferParams),
    Search(SearchParams),
    Repository(RepositoryParams),
    GitWorkspace(GitWorkspaceParams),
    GitBranch(GitBranchParams),
    GitCommit(GitCommitParams),
    GitTag(GitTagParams),
    Shell(ShellParams),
    Process(ProcessParams),
    Http(HttpParams),
    Download(DownloadParams),
    Host(HostParams),
    Query(QueryParams),
    DatabaseAdmin(DatabaseAdminParams),
    Image(ImageParams),
    Container(ContainerParams),
    Compose(ComposeParams),
    Packages(PackagesParams),
    Script(ScriptParams),
    Workspace(WorkspaceParams),
    EnvVar(EnvVarParams),
    Service(ServiceParams),
    Message(MessageParams),
    Email(EmailParams),
    Question(QuestionParams),
    Wait(WaitParams),
    Schedule(ScheduleParams),
    Task(TaskParams),
    Text(TextParams),
    CodeGen(CodeGenParams),
    Empty,
}

impl CommandParameters {
    /// Decode a parameter bag into the typed struct for `shape`
    ///
    /// A missing or null bag is treated as an empty object.
    pub fn decode(shape: ParamShape, value: &Value) -> Result<Self, serde_json::Error> {
        let value = match value {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };

        Ok(match shape {
            ParamShape::Path => Self::Path(serde_json::from_value(value)?),
            ParamShape::FileWrite => Self::FileWrite(serde_json::from_value(value)?),
            ParamShape::Transfer => Self::Transfer(serde_json::from_value(value)?),
            ParamShape::Search => Self::Search(serde_json::from_value(value)?),
            ParamShape::Repository => Self::Repository(serde_json::from_value(value)?),
            ParamShape::GitWorkspace => Self::GitWorkspace(serde_json::from_value(value)?),
            ParamShape::GitBranch => Self::GitBranch(serde_json::from_value(value)?),
            ParamShape::GitCommit => Self::GitCommit(serde_json::from_value(value)?),
            ParamShape::GitTag => Self::GitTag(serde_json::from_value(value)?),
            ParamShape::Shell => Self::Shell(serde_json::from_value(value)?),
            ParamShape::Process => Self::Process(serde_json::from_value(value)?),
            ParamShape::Http => Self::Http(serde_json::from_value(value)?),
            ParamShape::Download => Self::Download(serde_json::from_value(value)?),
            ParamShape::Host => Self::Host(serde_json::from_value(value)?),
            ParamShape::Query => Self::Query(serde_json::from_value(value)?),
            ParamShape::DatabaseAdmin => Self::DatabaseAdmin(serde_json::from_value(value)?),
            ParamShape::Image => Self::Image(serde_json::from_value(value)?),
            ParamShape::Container => Self::Container(serde_json::from_value(value)?),
            ParamShape::Compose => Self::Compose(serde_json::from_value(value)?),
            ParamShape::Packages => Self::Packages(serde_json::from_value(value)?),
            ParamShape::Script => Self::Script(serde_json::from_value(value)?),
            ParamShape::Workspace => Self::Workspace(serde_json::from_value(value)?),
            ParamShape::EnvVar => Self::EnvVar(serde_json::from_value(value)?),
            ParamShape::Service => Self::Service(serde_json::from_value(value)?),
            ParamShape::Message => Self::Message(serde_json::from_value(value)?),
            ParamShape::Email => Self::Email(serde_json::from_value(value)?),
            ParamShape::Question => Self::Question(serde_json::from_value(value)?),
            ParamShape::Wait => Self::Wait(serde_json::from_value(value)?),
            ParamShape::Schedule => Self::Schedule(serde_json::from_value(value)?),
            ParamShape::Task => Self::Task(serde_json::from_value(value)?),
            ParamShape::Text => Self::Text(serde_json::from_value(value)?),
            ParamShape::CodeGen => Self::CodeGen(serde_json::from_value(value)?),
            ParamShape::Empty => Self::Empty,
        })
    }

    pub fn shape(&self) -> ParamShape {
        match self {
            Self::Path(_) => ParamShape::Path,
            Self::FileWrite(_) => ParamShape::FileWrite,
            Self::Transfer(_) => ParamShape::Transfer,
            Self::Search(_) => ParamShape::Search,
            Self::Repository(_) => ParamShape::Repository,
            Self::GitWorkspace(_) => ParamShape::GitWorkspace,
            Self::GitBranch(_) => ParamShape::GitBranch,
            Self::GitCommit(_) => ParamShape::GitCommit,
            Self::GitTag(_) => ParamShape::GitTag,
            Self::Shell(_) => ParamShape::Shell,
            Self::Process(_) => ParamShape::Process,
            Self::Http(_) => ParamShape::Http,
            Self::Download(_) => ParamShape::Download,
            Self::Host(_) => ParamShape::Host,
            Self::Query(_) => ParamShape::Query,
            Self::DatabaseAdmin(_) => ParamShape::DatabaseAdmin,
            Self::Image(_) => ParamShape::Image,
            Self::Container(_) => ParamShape::Container,
            Self::Compose(_) => ParamShape::Compose,
            Self::Packages(_) => ParamShape::Packages,
            Self::Script(_) => ParamShape::Script,
            Self::Workspace(_) => ParamShape::Workspace,
            Self::EnvVar(_) => ParamShape::EnvVar,
            Self::Service(_) => ParamShape::Service,
            Self::Message(_) => ParamShape::Message,
            Self::Email(_) => ParamShape::Email,
            Self::Question(_) => ParamShape::Question,
            Self::Wait(_) => ParamShape::Wait,
            Self::Schedule(_) => ParamShape::Schedule,
            Self::Task(_) => ParamShape::Task,
            Self::Text(_) => ParamShape::Text,
            Self::CodeGen(_) => ParamShape::CodeGen,
            Self::Empty => ParamShape::Empty,
        }
    }
}
