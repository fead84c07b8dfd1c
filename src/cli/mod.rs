//! CLI definitions using clap, plus the wait and exit-code policies

use std::io::Read;
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

use crate::error::{KhError, Result};
use crate::object::{GroupResource, Object};
use crate::print::PrintOptions;
use crate::status::{ObjectStatus, Verdict};

#[derive(Parser, Debug)]
#[command(
    name = "kh",
    about = "Monitor Kubernetes resource health",
    disable_version_flag = true
)]
pub struct Cli {
    /// Resources to watch (KIND, KIND NAME or KIND/NAME); '-' reads a
    /// manifest stream from standard input
    pub resources: Vec<String>,

    /// Manifest files with resources to watch
    #[arg(short = 'f', long = "filename")]
    pub filenames: Vec<PathBuf>,

    /// Targets config file with root kinds to watch
    #[arg(long)]
    pub targets: Option<PathBuf>,

    /// Wait until resources finish progressing (regardless of the result)
    #[arg(short = 'W', long)]
    pub wait_progress: bool,

    /// Wait until the resources are ready (success only)
    #[arg(short = 'O', long)]
    pub wait_ok: bool,

    /// Wait forever
    #[arg(short = 'F', long)]
    pub wait_forever: bool,

    /// For each object, show the API group it belongs to
    #[arg(short = 'G', long)]
    pub show_group: bool,

    /// Show details for all objects, including those with OK status
    #[arg(short = 'A', long = "show-all")]
    pub show_all: bool,

    /// Width of the output. By default it's inferred from the terminal
    /// width. Set to 0 to disable wrapping
    #[arg(long, default_value_t = -1)]
    pub width: i32,

    /// Poll interval in seconds
    #[arg(long, default_value_t = 2)]
    pub interval: u64,

    /// Path to the kubeconfig file to use
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubernetes context to use
    #[arg(long, env = "KH_CONTEXT")]
    pub context: Option<String>,

    /// Namespace to use
    #[arg(short = 'n', long)]
    pub namespace: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Enable verbose logging
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print version information
    #[arg(long)]
    pub version: bool,
}

impl Cli {
    pub fn wait_policy(&self) -> WaitPolicy {
        if self.wait_forever {
            WaitPolicy::Forever
        } else if self.wait_ok {
            WaitPolicy::Ready
        } else if self.wait_progress {
            WaitPolicy::Progress
        } else {
            WaitPolicy::Once
        }
    }

    pub fn print_options(&self) -> PrintOptions {
        let width = if self.width < 0 {
            detect_width()
        } else {
            self.width as usize
        };
        PrintOptions {
            show_group: self.show_group,
            show_all: self.show_all,
            width,
        }
    }
}

fn detect_width() -> usize {
    crossterm::terminal::size()
        .map(|(w, _)| w as usize)
        .unwrap_or(0)
}

/// Decides when to stop waiting for the resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Finish after the first evaluation.
    Once,
    /// Loop until nothing is progressing.
    Progress,
    /// Loop until all roots are Ok and nothing is progressing.
    Ready,
    /// Never stop; only a signal terminates.
    Forever,
}

impl WaitPolicy {
    pub fn should_stop(&self, statuses: &[ObjectStatus]) -> bool {
        // Consider the unknown status as progressing as well.
        let progressing = statuses
            .iter()
            .any(|s| s.status.progressing || s.status.result == Verdict::Unknown);

        match self {
            WaitPolicy::Forever => false,
            WaitPolicy::Once => true,
            WaitPolicy::Progress => !progressing,
            WaitPolicy::Ready => {
                !progressing && statuses.iter().all(|s| s.status.result == Verdict::Ok)
            }
        }
    }
}

/// Exit code bitfield over the final statuses: the low bits carry the worst
/// result (0=Ok, 1=Warning, 2=Error, 3=Unknown), bit 3 is OR-ed in while
/// anything is still progressing.
pub fn exit_code(statuses: &[ObjectStatus]) -> i32 {
    let mut worst = Verdict::Unknown;
    for status in statuses {
        worst = worst.max(status.status.result);
    }

    let mut code = match worst {
        Verdict::Ok => 0,
        Verdict::Warning => 1,
        Verdict::Error => 2,
        Verdict::Unknown => 3,
    };

    if statuses.iter().any(|s| s.status.progressing) {
        code |= 0b1000;
    }
    code
}

/// A positional resource argument, resolved against discovery later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceArg {
    Kind(GroupResource),
    Named(GroupResource, String),
}

/// Parse positional arguments using the standard object-argument grammar:
/// either `TYPE1 [TYPE2...]`, `TYPE NAME1 [NAME2...]`, or `TYPE/NAME` forms.
pub fn parse_resource_args(args: &[String]) -> Result<Vec<ResourceArg>> {
    if args.is_empty() {
        return Ok(Vec::new());
    }

    if args.iter().any(|a| a.contains('/')) {
        return args
            .iter()
            .map(|arg| {
                match arg.split_once('/') {
                    Some((type_, name)) if !type_.is_empty() && !name.is_empty() && !name.contains('/') => {
                        Ok(ResourceArg::Named(GroupResource::parse(type_), name.to_string()))
                    }
                    _ => Err(KhError::InvalidArgument(format!(
                        "expected TYPE/NAME, got '{arg}'"
                    ))),
                }
            })
            .collect();
    }

    let types: Vec<GroupResource> = args[0]
        .split(',')
        .filter(|t| !t.is_empty())
        .map(GroupResource::parse)
        .collect();
    let names = &args[1..];

    if names.is_empty() {
        Ok(types.into_iter().map(ResourceArg::Kind).collect())
    } else if types.len() == 1 {
        Ok(names
            .iter()
            .map(|name| ResourceArg::Named(types[0].clone(), name.clone()))
            .collect())
    } else {
        Err(KhError::InvalidArgument(
            "a resource cannot be named when multiple resource types are given".into(),
        ))
    }
}

/// Read a multi-document YAML manifest stream into objects. `List` objects
/// are flattened into their items.
pub fn read_manifest(reader: impl Read) -> Result<Vec<Object>> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_reader(reader) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        let json = serde_json::to_value(&value)?;

        if json.get("kind").and_then(|k| k.as_str()) == Some("List") {
            if let Some(items) = json.get("items").and_then(|i| i.as_array()) {
                for item in items {
                    objects.push(Object::from_value(item.clone())?);
                }
            }
            continue;
        }
        objects.push(Object::from_value(json)?);
    }
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;
    use serde_json::json;
    use std::sync::Arc;

    fn status(result: Verdict, progressing: bool) -> ObjectStatus {
        let obj = Arc::new(
            Object::from_value(json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": "p", "namespace": "default", "uid": "u"},
            }))
            .unwrap(),
        );
        ObjectStatus {
            object: obj,
            status: Status {
                result,
                progressing,
                message: result.as_str().to_string(),
                error: None,
            },
            conditions: Vec::new(),
            children: Vec::new(),
        }
    }

    #[test]
    fn test_parse_wait_flags() {
        let cli = Cli::parse_from(["kh", "-W", "pods"]);
        assert!(cli.wait_progress);
        assert_eq!(cli.wait_policy(), WaitPolicy::Progress);

        let cli = Cli::parse_from(["kh", "-O", "pods"]);
        assert_eq!(cli.wait_policy(), WaitPolicy::Ready);

        let cli = Cli::parse_from(["kh", "-F", "pods"]);
        assert_eq!(cli.wait_policy(), WaitPolicy::Forever);

        let cli = Cli::parse_from(["kh", "pods"]);
        assert_eq!(cli.wait_policy(), WaitPolicy::Once);
    }

    #[test]
    fn test_parse_display_flags() {
        let cli = Cli::parse_from(["kh", "-G", "-A", "--width", "120", "pods"]);
        assert!(cli.show_group);
        assert!(cli.show_all);
        assert_eq!(cli.width, 120);
        assert_eq!(cli.print_options().width, 120);
    }

    #[test]
    fn test_parse_positional_resources() {
        let cli = Cli::parse_from(["kh", "deploy", "web"]);
        assert_eq!(cli.resources, vec!["deploy", "web"]);
    }

    #[test]
    fn test_parse_interval_default() {
        let cli = Cli::parse_from(["kh", "pods"]);
        assert_eq!(cli.interval, 2);
    }

    #[test]
    fn test_resource_args_kinds_only() {
        let args = vec!["pods,deployments.apps".to_string()];
        let parsed = parse_resource_args(&args).unwrap();
        assert_eq!(
            parsed,
            vec![
                ResourceArg::Kind(GroupResource::new("", "pods")),
                ResourceArg::Kind(GroupResource::new("apps", "deployments")),
            ]
        );
    }

    #[test]
    fn test_resource_args_type_and_names() {
        let args = vec!["pods".to_string(), "p1".to_string(), "p2".to_string()];
        let parsed = parse_resource_args(&args).unwrap();
        assert_eq!(
            parsed,
            vec![
                ResourceArg::Named(GroupResource::new("", "pods"), "p1".to_string()),
                ResourceArg::Named(GroupResource::new("", "pods"), "p2".to_string()),
            ]
        );
    }

    #[test]
    fn test_resource_args_slash_form() {
        let args = vec!["deployments.apps/web".to_string()];
        let parsed = parse_resource_args(&args).unwrap();
        assert_eq!(
            parsed,
            vec![ResourceArg::Named(
                GroupResource::new("apps", "deployments"),
                "web".to_string()
            )]
        );
    }

    #[test]
    fn test_resource_args_invalid_slash() {
        assert!(parse_resource_args(&["pods/".to_string()]).is_err());
        assert!(parse_resource_args(&["pods/a/b".to_string()]).is_err());
    }

    #[test]
    fn test_resource_args_multiple_types_with_name() {
        let args = vec!["pods,services".to_string(), "web".to_string()];
        assert!(parse_resource_args(&args).is_err());
    }

    #[test]
    fn test_read_manifest_multi_doc() {
        let manifest = "\
apiVersion: v1
kind: Pod
metadata:
  name: p1
  namespace: default
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: default
";
        let objects = read_manifest(manifest.as_bytes()).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].types.kind, "Pod");
        assert_eq!(objects[1].types.kind, "Deployment");
    }

    #[test]
    fn test_read_manifest_flattens_list() {
        let manifest = "\
apiVersion: v1
kind: List
items:
  - apiVersion: v1
    kind: Pod
    metadata:
      name: p1
  - apiVersion: v1
    kind: Pod
    metadata:
      name: p2
";
        let objects = read_manifest(manifest.as_bytes()).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1].name(), "p2");
    }

    #[test]
    fn test_exit_code_ok() {
        assert_eq!(exit_code(&[status(Verdict::Ok, false)]), 0);
    }

    #[test]
    fn test_exit_code_error_and_progressing_bits() {
        // One root failing, another still progressing: Error (2) | 8.
        let statuses = vec![status(Verdict::Error, false), status(Verdict::Ok, true)];
        assert_eq!(exit_code(&statuses), 0b1010);
    }

    #[test]
    fn test_exit_code_unknown_only_without_evidence() {
        assert_eq!(exit_code(&[status(Verdict::Unknown, false)]), 3);
        // Unknown never overrides a worse verdict.
        let statuses = vec![status(Verdict::Unknown, false), status(Verdict::Warning, false)];
        assert_eq!(exit_code(&statuses), 1);
    }

    #[test]
    fn test_wait_policy_progress() {
        let policy = WaitPolicy::Progress;
        assert!(!policy.should_stop(&[status(Verdict::Error, true)]));
        // Unknown counts as still progressing.
        assert!(!policy.should_stop(&[status(Verdict::Unknown, false)]));
        assert!(policy.should_stop(&[status(Verdict::Error, false)]));
    }

    #[test]
    fn test_wait_policy_ready() {
        let policy = WaitPolicy::Ready;
        assert!(!policy.should_stop(&[status(Verdict::Ok, true)]));
        assert!(!policy.should_stop(&[status(Verdict::Error, false)]));
        assert!(policy.should_stop(&[status(Verdict::Ok, false)]));
    }
}
