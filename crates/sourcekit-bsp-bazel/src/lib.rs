//! Bazel integration for the sourcekit BSP server.
//!
//! This crate turns a set of top-level Bazel labels into the target records
//! the protocol layer serves:
//! - `bazel aquery --output=jsonproto` invocation and decoding
//! - path reconstruction from the deduplicated path-fragment trie
//! - compiler-argument normalization (placeholder substitution, wrapper-flag
//!   removal) so the indexer can run the invocation against the workspace
//! - parallel per-action processing with value deduplication
//! - an on-disk cache with read-through and background refresh

mod aquery;
mod arguments;
mod cache;
mod command;
mod engine;
mod error;
mod graph;
mod processor;
mod sdk;
mod target;

pub use crate::{
    aquery::{
        parse_action_graph, Action, ActionGraph, Artifact, DepSetOfFiles, EnvironmentVariable,
        PathFragment, QueriedTarget,
    },
    arguments::{rewrite_arguments, RewrittenArguments},
    cache::{cache_key, default_cache_path, CacheEntry, CacheFile, TargetCache},
    command::{CommandRunner, DefaultCommandRunner},
    engine::{ExecuteRequest, ExtractionEngine},
    error::{Error, Result},
    graph::ActionGraphIndex,
    processor::process_actions,
    sdk::{select_sdk_root, IPHONE_SIMULATOR_SDK_ROOT, MACOS_SDK_ROOT, XCODE_DEVELOPER_DIR},
    target::BazelTarget,
};
