// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// End-to-end runs of small pipelines through the process executor, with
/// bash scripts standing in for the wrapped tools.
#[cfg(test)]
mod tests {
    use crate::config::{load_and_validate_config, RuntimeBuilder};
    use crate::engine::{ExecutionOutcome, RunSummary, TaskOutcome};
    use std::fs;
    use std::path::Path;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    const HEADER: &str = r#"
engine: { kind: local }
executor_options: { max_concurrency: 4 }
"#;

    const PROCESSES: &str = r#"
processes:
  - name: ALIGN
    label: process_single
    script: cp {{ fasta }} {{ prefix(fasta) }}_mafft.fa
    inputs:
      - name: fasta
    outputs:
      - { emit: fas, pattern: "*_mafft.fa" }
    container: { registry: "docker.io/library/bash:5" }
  - name: ALIGN_NOTHING
    label: process_single
    script: "true"
    inputs:
      - name: fasta
    outputs:
      - { emit: fas, pattern: "*_mafft.fa" }
    container: { registry: "docker.io/library/bash:5" }
  - name: TREE
    label: process_medium
    script: |
      echo "FastTree -threads {{ threads_above(alignment) }} {{ alignment }}" > {{ prefix(alignment) }}_ft.treefile
    inputs:
      - name: alignment
    outputs:
      - { emit: phylogeny, pattern: "*_ft.treefile" }
    container: { registry: "docker.io/library/bash:5" }
    version:
      tool: faketree
      command: "echo 'FastTree version 2.1.11 SSE3'"
      rule: { pattern: 'FastTree version ([0-9.]+)' }
  - name: SH
    label: process_single
    script: "{{ args }}"
    container: { registry: "docker.io/library/bash:5" }
"#;

    fn fasta(records: usize) -> String {
        (0..records)
            .map(|i| format!(">seq{}\nMKVLAAGIVALLLAAGC\n", i))
            .collect()
    }

    /// Write the pipeline with inputs of 10, 14, 15 and 20 records.
    fn write_pipeline(dir: &Path, extra: &str, tasks: &str) -> std::path::PathBuf {
        for records in [10, 14, 15, 20] {
            fs::write(dir.join(format!("sp{}.fa", records)), fasta(records)).unwrap();
        }
        let path = dir.join("pipeline.yaml");
        let yaml = [HEADER, extra, PROCESSES, "tasks:\n", tasks].concat();
        fs::write(&path, yaml).unwrap();
        path
    }

    async fn run_pipeline(dir: &Path, extra: &str, tasks: &str, resume: bool) -> RunSummary {
        let path = write_pipeline(dir, extra, tasks);
        let config = load_and_validate_config(&path).unwrap();
        let runtime = RuntimeBuilder::from_config(&config, resume).unwrap();
        runtime.prepare_work_dir(resume).unwrap();
        runtime.run(CancellationToken::new()).await
    }

    fn tree_pipeline(input: &str) -> String {
        format!(
            r#"
  - id: align
    process: ALIGN
    inputs:
      fasta: {{ files: [{}] }}
  - id: tree
    process: TREE
    depends_on: [align]
    inputs:
      alignment: {{ channel: fas }}
"#,
            input
        )
    }

    fn command_script(summary: &RunSummary, task_id: &str) -> String {
        let work_dir = summary
            .task(task_id)
            .and_then(|r| r.work_dir.clone())
            .unwrap();
        fs::read_to_string(work_dir.join(".command.sh")).unwrap()
    }

    #[tokio::test]
    async fn test_small_alignment_builds_tree_single_threaded() {
        let dir = TempDir::new().unwrap();
        let summary = run_pipeline(dir.path(), "", &tree_pipeline("sp10.fa"), false).await;

        assert_eq!(summary.exit_code(), 0, "{}", summary.render_table());
        assert_eq!(
            summary.outcome("tree"),
            Some(&TaskOutcome::Succeeded { resumed: false })
        );
        assert!(command_script(&summary, "tree").contains("FastTree -threads 1 "));

        let outputs = &summary.task("tree").unwrap().outputs;
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].to_string_lossy().ends_with("sp10_ft.treefile"));
        assert!(outputs[0].exists());
    }

    #[tokio::test]
    async fn test_large_alignment_uses_configured_cpus() {
        let dir = TempDir::new().unwrap();
        let profiles = "profiles:\n  process_medium: { cpus: 8, memory: 16.GB }\n";
        let summary = run_pipeline(dir.path(), profiles, &tree_pipeline("sp20.fa"), false).await;

        assert_eq!(summary.exit_code(), 0, "{}", summary.render_table());
        assert!(command_script(&summary, "tree").contains("FastTree -threads 8 "));
        let treefile = &summary.task("tree").unwrap().outputs[0];
        assert_eq!(
            fs::read_to_string(treefile).unwrap().trim(),
            "FastTree -threads 8 sp20_mafft.fa"
        );
    }

    #[tokio::test]
    async fn test_thread_threshold_boundary() {
        let dir = TempDir::new().unwrap();
        let profiles = "profiles:\n  process_medium: { cpus: 8, memory: 16.GB }\n";
        let tasks = r#"
  - id: tree14
    process: TREE
    inputs:
      alignment: { files: [sp14.fa] }
  - id: tree15
    process: TREE
    inputs:
      alignment: { files: [sp15.fa] }
"#;
        let summary = run_pipeline(dir.path(), profiles, tasks, false).await;

        assert_eq!(summary.exit_code(), 0, "{}", summary.render_table());
        assert!(command_script(&summary, "tree14").contains("-threads 1 "));
        assert!(command_script(&summary, "tree15").contains("-threads 8 "));
    }

    #[tokio::test]
    async fn test_missing_output_fails_dependents() {
        let dir = TempDir::new().unwrap();
        let tasks = r#"
  - id: align
    process: ALIGN_NOTHING
    inputs:
      fasta: { files: [sp10.fa] }
  - id: tree
    process: TREE
    depends_on: [align]
    inputs:
      alignment: { channel: fas }
"#;
        let summary = run_pipeline(dir.path(), "", tasks, false).await;

        assert_eq!(
            summary.outcome("align"),
            Some(&TaskOutcome::Failed {
                outcome: ExecutionOutcome::MissingOutput {
                    patterns: vec!["*_mafft.fa".into()]
                }
            })
        );
        assert_eq!(
            summary.outcome("tree"),
            Some(&TaskOutcome::UpstreamFailed {
                upstream: "align".into()
            })
        );
        assert_eq!(summary.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_tool_failure_leaves_independent_branch_running() {
        let dir = TempDir::new().unwrap();
        let tasks = r#"
  - id: broken
    process: SH
    ext: { args: "echo 'segfault in tree search' >&2; exit 3" }
  - id: after_broken
    process: SH
    depends_on: [broken]
    ext: { args: "true" }
  - id: independent
    process: SH
    ext: { args: "sleep 0.2" }
"#;
        let summary = run_pipeline(dir.path(), "", tasks, false).await;

        assert_eq!(
            summary.outcome("broken"),
            Some(&TaskOutcome::Failed {
                outcome: ExecutionOutcome::ToolFailure { exit_code: 3 }
            })
        );
        assert_eq!(summary.task("broken").unwrap().exit_code, Some(3));
        assert!(matches!(
            summary.outcome("after_broken"),
            Some(TaskOutcome::UpstreamFailed { .. })
        ));
        assert_eq!(
            summary.outcome("independent"),
            Some(&TaskOutcome::Succeeded { resumed: false })
        );
        assert_eq!(summary.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_fail_fast_kills_running_tasks() {
        let dir = TempDir::new().unwrap();
        let tasks = r#"
  - id: broken
    process: SH
    ext: { args: "sleep 0.2; exit 1" }
  - id: slow
    process: SH
    ext: { args: "sleep 30" }
"#;
        let started = Instant::now();
        let summary = run_pipeline(dir.path(), "failure_strategy: fail_fast\n", tasks, false).await;

        assert!(started.elapsed() < Duration::from_secs(20));
        assert!(summary.cancelled);
        assert_eq!(summary.outcome("slow"), Some(&TaskOutcome::Cancelled));
        assert_eq!(summary.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_default_timeout_kills_task() {
        let dir = TempDir::new().unwrap();
        let options = "executor_options: { timeout_seconds: 1 }\n";
        let tasks = r#"
  - id: stuck
    process: SH
    ext: { args: "sleep 30" }
"#;
        // One second default limit instead of the header's options.
        let path = write_pipeline(dir.path(), "", tasks);
        let yaml = fs::read_to_string(&path)
            .unwrap()
            .replace("executor_options: { max_concurrency: 4 }\n", options);
        fs::write(&path, yaml).unwrap();

        let config = load_and_validate_config(&path).unwrap();
        let runtime = RuntimeBuilder::from_config(&config, false).unwrap();
        runtime.prepare_work_dir(false).unwrap();
        let started = Instant::now();
        let summary = runtime.run(CancellationToken::new()).await;

        assert!(started.elapsed() < Duration::from_secs(20));
        assert!(matches!(
            summary.outcome("stuck"),
            Some(TaskOutcome::Failed {
                outcome: ExecutionOutcome::Timeout { .. }
            })
        ));
    }

    #[tokio::test]
    async fn test_skipped_tree_and_version_union() {
        let dir = TempDir::new().unwrap();
        let tasks = r#"
  - id: tree_kept
    process: TREE
    inputs:
      alignment: { files: [sp10.fa] }
  - id: tree_skipped
    process: TREE
    inputs:
      alignment: { files: [sp20.fa] }
    ext:
      when: false
"#;
        let summary = run_pipeline(dir.path(), "", tasks, false).await;

        assert_eq!(summary.exit_code(), 0, "{}", summary.render_table());
        assert_eq!(summary.outcome("tree_skipped"), Some(&TaskOutcome::Skipped));
        assert_eq!(summary.versions.get("TREE", "faketree"), Some("2.1.11"));
    }

    #[tokio::test]
    async fn test_resume_reuses_finished_tasks() {
        let dir = TempDir::new().unwrap();
        let first = run_pipeline(dir.path(), "", &tree_pipeline("sp10.fa"), true).await;
        assert_eq!(
            first.outcome("tree"),
            Some(&TaskOutcome::Succeeded { resumed: false })
        );

        let second = run_pipeline(dir.path(), "", &tree_pipeline("sp10.fa"), true).await;
        assert_eq!(
            second.outcome("align"),
            Some(&TaskOutcome::Succeeded { resumed: true })
        );
        assert_eq!(
            second.outcome("tree"),
            Some(&TaskOutcome::Succeeded { resumed: true })
        );
        assert_eq!(second.exit_code(), 0);
    }
}
