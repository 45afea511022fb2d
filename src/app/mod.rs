use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::address::AddressAudit;
use crate::count::CountHandler;
use crate::entity::EntityKind;
use crate::grep::{GrepHandler, MatchSpec, TagExpr, VersionFilter};
use crate::lastnode::LastNodeHandler;
use crate::noderef::NodeRefHandler;
use crate::pipeline::run_stream;
use crate::sinks::{EntitySink, JsonlSink};
use crate::stats::StatsHandler;
use crate::store::{CacheMode, LocationStoreWriter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Per-way interpolation diagnostics are emitted at debug level.
    pub fn wants_debug_log(&self) -> bool {
        matches!(
            self.command,
            Command::Addresses {
                debug_interpolation: true,
                ..
            }
        )
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Count nodes, ways and relations
    Count {
        /// Input PBF file
        input: PathBuf,
    },

    /// Filter entities by kind, user, id, tags and version
    Grep {
        /// Input PBF file
        input: PathBuf,

        /// Entity kinds to consider (default: all)
        #[arg(short = 't', long = "type", value_enum)]
        types: Vec<KindArg>,

        /// Object ids to match
        #[arg(short = 'i', long = "id")]
        ids: Vec<i64>,

        /// User ids to match
        #[arg(short = 'U', long = "uid")]
        uids: Vec<i64>,

        /// User names to match (exact)
        #[arg(short = 'u', long = "user")]
        users: Vec<String>,

        /// Tag expression, key=value or key=* (repeatable)
        #[arg(short = 'e', long = "expr")]
        exprs: Vec<String>,

        /// Version constraint: N (exact), N+ (at least), N- (at most)
        #[arg(long = "version-is")]
        version: Option<String>,

        /// Forward matched entities as JSON lines ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Print the highest node id
    Lastnode {
        /// Input PBF file
        input: PathBuf,
    },

    /// Histogram of how often ways reference each node
    Noderef {
        /// Input PBF file
        input: PathBuf,
    },

    /// Count house numbers, including interpolated address ranges
    Addresses {
        /// Input PBF file
        input: PathBuf,

        /// Log each ignored interpolation way
        #[arg(short = 'd', long)]
        debug_interpolation: bool,
    },

    /// Summarize road lengths and point-of-interest counts
    Stats {
        /// Input PBF file
        input: PathBuf,

        /// Force specific node cache mode
        #[arg(long, value_enum, default_value = "auto")]
        node_cache_mode: CacheMode,

        /// Maximum nodes for the dense cache
        #[arg(long, default_value_t = 12_000_000_000)]
        node_cache_max_nodes: u64,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum KindArg {
    Node,
    Way,
    Relation,
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Node => EntityKind::Node,
            KindArg::Way => EntityKind::Way,
            KindArg::Relation => EntityKind::Relation,
        }
    }
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Count { input } => run_count(&input),
        Command::Grep {
            input,
            types,
            ids,
            uids,
            users,
            exprs,
            version,
            output,
        } => {
            let spec = build_match_spec(types, ids, uids, users, &exprs, version.as_deref())?;
            run_grep(&input, spec, output.as_deref())
        }
        Command::Lastnode { input } => run_lastnode(&input),
        Command::Noderef { input } => run_noderef(&input),
        Command::Addresses {
            input,
            debug_interpolation,
        } => run_addresses(&input, debug_interpolation),
        Command::Stats {
            input,
            node_cache_mode,
            node_cache_max_nodes,
        } => run_stats(&input, node_cache_mode, node_cache_max_nodes),
    }
}

fn run_count(input: &Path) -> Result<()> {
    let mut handler = CountHandler::default();
    run_stream(input, &mut handler, "elements")
}

fn run_lastnode(input: &Path) -> Result<()> {
    let mut handler = LastNodeHandler::default();
    run_stream(input, &mut handler, "nodes")
}

fn run_noderef(input: &Path) -> Result<()> {
    let mut handler = NodeRefHandler::default();
    run_stream(input, &mut handler, "elements")
}

pub fn build_match_spec(
    types: Vec<KindArg>,
    ids: Vec<i64>,
    uids: Vec<i64>,
    users: Vec<String>,
    exprs: &[String],
    version: Option<&str>,
) -> Result<MatchSpec> {
    let exprs = exprs
        .iter()
        .map(|expr| TagExpr::parse(expr))
        .collect::<Result<Vec<_>>>()
        .context("CLI: Invalid --expr")?;
    let version = version
        .map(VersionFilter::parse)
        .transpose()
        .context("CLI: Invalid --version-is")?;
    Ok(MatchSpec {
        kinds: types.into_iter().map(EntityKind::from).collect(),
        ids,
        uids,
        users,
        exprs,
        version,
    })
}

pub fn init_sink(output: &Path) -> Result<Box<dyn EntitySink>> {
    if output == Path::new("-") {
        tracing::info!("Sink: jsonl -> stdout");
        Ok(Box::new(JsonlSink::stdout()))
    } else {
        tracing::info!("Sink: jsonl -> {:?}", output);
        let sink = JsonlSink::new(output)
            .with_context(|| format!("CLI: Failed to create output file {}", output.display()))?;
        Ok(Box::new(sink))
    }
}

fn run_grep(input: &Path, spec: MatchSpec, output: Option<&Path>) -> Result<()> {
    let sink = output.map(init_sink).transpose()?;
    let mut handler = GrepHandler::new(spec, sink);
    run_stream(input, &mut handler, "elements")
}

fn run_addresses(input: &Path, debug_interpolation: bool) -> Result<()> {
    let mut handler = AddressAudit::new(debug_interpolation);
    run_stream(input, &mut handler, "elements")
}

fn run_stats(input: &Path, cache_mode: CacheMode, max_nodes: u64) -> Result<()> {
    let mode = cache_mode.resolve(input);
    tracing::info!("Node cache mode: {:?}", mode);
    let writer = LocationStoreWriter::for_mode(mode, max_nodes)
        .context("CLI: Failed to create location store")?;
    let mut handler = StatsHandler::new(writer);
    run_stream(input, &mut handler, "elements")
}
