//! Download task execution -- one chapter from preflight to materialization.
//!
//! Split into focused submodules:
//! - [`context`] - Shared pipeline state and per-chapter paths
//! - [`orchestration`] - Top-level chapter task lifecycle
//! - [`preflight`] - Free space check and staging directory
//! - [`pages`] - Page list resolution and image acquisition
//! - [`finalization`] - Completion check, materialization and final status

mod context;
mod finalization;
mod orchestration;
mod pages;
mod preflight;


pub(crate) use context::{ChapterTask, PipelineContext};
pub(crate) use orchestration::run_download_task;
