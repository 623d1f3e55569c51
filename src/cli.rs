//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use index_mirror::config::{DEFAULT_CONCURRENCY, DEFAULT_ROOT_URI, MirrorConfig};
use index_mirror::crawl::DEFAULT_IGNORED_SUFFIXES;
use index_mirror::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};

/// Mirror an HTTP directory-index tree to local storage.
///
/// Only the newest of each family of sibling version directories
/// (`NN.NN.NN_NN`) is mirrored; older ones are pruned locally.
#[derive(Parser, Debug)]
#[command(name = "index-mirror")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Local directory to mirror into
    #[arg(short, long, env = "INDEX_MIRROR_DEST", default_value = ".")]
    pub dest: PathBuf,

    /// Root URI of the remote tree
    #[arg(short, long, env = "INDEX_MIRROR_URI", default_value = DEFAULT_ROOT_URI)]
    pub uri: String,

    /// Worker threads (defaults to the available parallelism)
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: Option<u16>,

    /// Maximum concurrent fetches (1-100)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: u8,

    /// File name suffix that is never downloaded (repeatable; replaces the defaults)
    #[arg(long = "ignore-suffix", value_name = "SUFFIX", default_values = DEFAULT_IGNORED_SUFFIXES.iter().copied())]
    pub ignore_suffixes: Vec<String>,

    /// Report superseded version directories instead of deleting them
    #[arg(long)]
    pub keep_expired: bool,

    /// Print the crawl summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// HTTP connect timeout in seconds
    #[arg(long, default_value_t = CONNECT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..))]
    pub connect_timeout: u64,

    /// HTTP read timeout in seconds
    #[arg(long, default_value_t = READ_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..))]
    pub read_timeout: u64,
}

impl Args {
    /// Builds the library configuration from the parsed flags.
    pub fn to_config(&self) -> MirrorConfig {
        MirrorConfig {
            destination: self.dest.clone(),
            root_uri: self.uri.clone(),
            workers: self.workers.map(usize::from),
            concurrency: usize::from(self.concurrency),
            ignored_suffixes: self.ignore_suffixes.clone(),
            prune_expired: !self.keep_expired,
            connect_timeout_secs: self.connect_timeout,
            read_timeout_secs: self.read_timeout,
        }
    }
}
