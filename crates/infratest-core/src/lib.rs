//! Infratest Core Library
//!
//! Lifecycle testing for infrastructure modules: isolate a module, run
//! `init`/`plan`/`apply` with typed variables and transient-failure retry,
//! assert on outputs, and always `destroy` what was created. Static
//! validation of many modules runs alongside.

pub mod config;
pub mod error;
pub mod executor;
pub mod fakes;
pub mod lifecycle;
pub mod naming;
pub mod obs;
pub mod options;
pub mod outputs;
pub mod retry;
pub mod telemetry;
pub mod validate;
pub mod vars;
pub mod workspace;

pub use config::{google_project_id_from_env, running_in_ci, HarnessConfig};
pub use error::{ErrorLayer, HarnessError, HarnessResult};
pub use executor::{CommandOutput, Invocation, TerraformCli, ToolExecutor};
pub use lifecycle::{LifecycleResult, LifecycleRunner};
pub use naming::{namespaced, unique_id, DEFAULT_PREFIX};
pub use options::{build_options, ExecutionOptions, OptionsBuilder, ProviderProfile};
pub use outputs::{assert_count, assert_non_empty, get_list, get_map, get_scalar};
pub use retry::{retry_transient, RetryPolicy, TransientClassifier};
pub use validate::{ValidationOutcome, ValidationReport, ValidationRunner, SUCCESS_MARKER};
pub use vars::{VarValue, Variables};
pub use workspace::{isolate, isolate_scoped, isolate_with_config, CopyScope, ModuleWorkspace};
