/// Default root for per-task working directories, relative to the pipeline file
pub const DEFAULT_WORK_DIR: &str = "work";

/// Marker left in a work root that phylowood created or adopted
pub const WORK_DIR_MARKER: &str = ".phylowood";

/// Record count a FASTA input must exceed before a tree builder gets more than one thread
pub const DEFAULT_THREAD_THRESHOLD: usize = 14;

/// Version recorded when a tool's version output cannot be parsed
pub const UNKNOWN_VERSION: &str = "unknown";

/// Emit tag under which every successful task publishes its versions file
pub const VERSIONS_TAG: &str = "versions";
pub const VERSIONS_FILE: &str = "versions.yml";

/// Files the executor leaves in each task work dir
pub const COMMAND_SCRIPT: &str = ".command.sh";
pub const COMMAND_STDOUT: &str = ".command.out";
pub const COMMAND_STDERR: &str = ".command.err";
pub const COMMAND_EXIT_CODE: &str = ".exitcode";
pub const COMMAND_VERSION: &str = ".command.version";

/// Run-level provenance output, relative to the work dir
pub const PIPELINE_INFO_DIR: &str = "pipeline_info";
pub const SOFTWARE_VERSIONS_FILE: &str = "software_versions.yml";

/// Exit status the docker CLI uses when the container itself could not start
pub const DOCKER_LAUNCH_FAILURE_CODE: i32 = 125;
/// Exit status singularity uses when the image or runtime is unavailable
pub const SINGULARITY_LAUNCH_FAILURE_CODE: i32 = 255;
