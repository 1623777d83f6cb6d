// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Command lines for running a staged script under each engine.

use crate::config::consts::{
    COMMAND_SCRIPT, DOCKER_LAUNCH_FAILURE_CODE, SINGULARITY_LAUNCH_FAILURE_CODE,
};
use crate::config::{EngineKind, EnvironmentRef, Memory};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// A program plus arguments, run with the scratch directory as cwd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: String,
    pub args: Vec<String>,
    /// Name given to the container, so it can be stopped from outside
    pub container_name: Option<String>,
}

impl LaunchPlan {
    pub fn build(
        engine: EngineKind,
        environment: &EnvironmentRef,
        scratch: &Path,
        input_dirs: &BTreeSet<PathBuf>,
        cpus: usize,
        memory: Memory,
        container_name: &str,
    ) -> Self {
        let scratch = scratch.to_string_lossy().into_owned();
        match engine {
            EngineKind::Local => LaunchPlan {
                program: "bash".into(),
                args: vec![COMMAND_SCRIPT.into()],
                container_name: None,
            },
            EngineKind::Docker => {
                let mut args = vec![
                    "run".to_string(),
                    "--rm".into(),
                    "--name".into(),
                    container_name.to_string(),
                    "--cpus".into(),
                    cpus.to_string(),
                    "--memory".into(),
                    format!("{}m", memory.as_mb()),
                    "-v".into(),
                    format!("{0}:{0}", scratch),
                ];
                for dir in input_dirs {
                    args.push("-v".into());
                    args.push(format!("{0}:{0}:ro", dir.to_string_lossy()));
                }
                args.extend([
                    "-w".into(),
                    scratch,
                    environment.reference().to_string(),
                    "bash".into(),
                    COMMAND_SCRIPT.into(),
                ]);
                LaunchPlan {
                    program: "docker".into(),
                    args,
                    container_name: Some(container_name.to_string()),
                }
            }
            EngineKind::Singularity => {
                let image = match environment {
                    EnvironmentRef::Singularity(uri) => uri.clone(),
                    EnvironmentRef::Registry(image) => format!("docker://{}", image),
                };
                let mut args = vec![
                    "exec".to_string(),
                    "--cleanenv".into(),
                    "--pwd".into(),
                    scratch.clone(),
                    "-B".into(),
                    scratch,
                ];
                for dir in input_dirs {
                    args.push("-B".into());
                    args.push(dir.to_string_lossy().into_owned());
                }
                args.extend([image, "bash".into(), COMMAND_SCRIPT.into()]);
                LaunchPlan {
                    program: "singularity".into(),
                    args,
                    container_name: None,
                }
            }
        }
    }
}

/// Exit status the engine itself uses to report that nothing was started.
pub fn launch_failure_code(engine: EngineKind) -> Option<i32> {
    match engine {
        EngineKind::Local => None,
        EngineKind::Docker => Some(DOCKER_LAUNCH_FAILURE_CODE),
        EngineKind::Singularity => Some(SINGULARITY_LAUNCH_FAILURE_CODE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirs() -> BTreeSet<PathBuf> {
        BTreeSet::from([PathBuf::from("/data/fasta")])
    }

    #[test]
    fn test_local_plan() {
        let env = EnvironmentRef::Registry("quay.io/biocontainers/mafft:7.490--h779adbc_0".into());
        let plan = LaunchPlan::build(
            EngineKind::Local,
            &env,
            Path::new("/work/align/.scratch-x"),
            &dirs(),
            2,
            Memory::from_gb(4),
            "phylowood-x",
        );
        assert_eq!(plan.program, "bash");
        assert_eq!(plan.args, vec![".command.sh"]);
    }

    #[test]
    fn test_docker_plan_mounts_and_limits() {
        let env = EnvironmentRef::Registry("quay.io/biocontainers/mafft:7.490--h779adbc_0".into());
        let plan = LaunchPlan::build(
            EngineKind::Docker,
            &env,
            Path::new("/work/align/.scratch-x"),
            &dirs(),
            6,
            Memory::from_gb(36),
            "phylowood-x",
        );
        assert_eq!(plan.program, "docker");
        assert_eq!(plan.container_name.as_deref(), Some("phylowood-x"));
        let joined = plan.args.join(" ");
        assert!(joined.contains("--cpus 6 --memory 36864m"));
        assert!(joined.contains("-v /data/fasta:/data/fasta:ro"));
        assert!(joined.ends_with("quay.io/biocontainers/mafft:7.490--h779adbc_0 bash .command.sh"));
    }

    #[test]
    fn test_singularity_runs_registry_images_via_docker_uri() {
        let env = EnvironmentRef::Registry("quay.io/biocontainers/fasttree:2.1.10--h516909a_4".into());
        let plan = LaunchPlan::build(
            EngineKind::Singularity,
            &env,
            Path::new("/s"),
            &BTreeSet::new(),
            1,
            Memory::from_gb(1),
            "unused",
        );
        assert_eq!(plan.program, "singularity");
        assert!(plan
            .args
            .contains(&"docker://quay.io/biocontainers/fasttree:2.1.10--h516909a_4".to_string()));
    }

    #[test]
    fn test_launch_failure_codes() {
        assert_eq!(launch_failure_code(EngineKind::Docker), Some(125));
        assert_eq!(launch_failure_code(EngineKind::Singularity), Some(255));
        assert_eq!(launch_failure_code(EngineKind::Local), None);
    }
}
