// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Process specifications and their instantiation into runnable tasks.

mod artifact;
pub mod catalog;
mod context;
mod instantiate;
mod predicate;
mod spec;
pub mod template;

pub use artifact::{Artifact, ArtifactValue};
pub use context::TaskContext;
pub use instantiate::{
    assemble_script, Instantiation, Instantiator, ResolvedTask, SkippedTask, TaskRequest,
};
pub use predicate::{truthy, ExtValues, Params, Predicate};
pub use spec::{
    Arity, InputDecl, OutputDecl, ProcessSpec, ProcessSpecBuilder, ValueKind, VersionCapture,
};
pub use template::{ScriptTemplate, TemplateFunction, TemplateFunctions};
