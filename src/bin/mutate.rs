//! Mutate a file made of length-prefixed records, steered by a seed file.
//!
//! Usage:
//!   mutate [OPTIONS] INPUT SEED [OUTPUT]
//!
//! The input is dissected as back-to-back records (`length` then `body`). Bytes read
//! from SEED decide how many mutations to apply, which record each one targets and
//! what it does (delete the record, duplicate it, or cut its body short). Length
//! fields are repaired afterwards, so the output stays well-formed. Running twice
//! with the same seed gives the same output.
//!
//! Options:
//!   --width=N    Width of the length field in bytes (default 2, big endian)
//!   --verbose, -v  Print the tree before and after mutation to stderr
//!
//! Without OUTPUT the mutated bytes go to stdout.

use msgtree::dump::format_tree;
use msgtree::{
    Cursor, DecisionReader, EntropySource, Endianness, Filter, IoEntropy, LengthPrefixed,
    MessageTree, NodeId, SamplerError,
};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy)]
enum Mutation {
    Delete,
    Duplicate,
    Truncate,
}

/// Relative weights of `Delete`, `Duplicate` and `Truncate`.
const MUTATION_WEIGHTS: [u64; 3] = [2, 2, 1];

fn mutation_name(m: Mutation) -> &'static str {
    match m {
        Mutation::Delete => "delete",
        Mutation::Duplicate => "duplicate",
        Mutation::Truncate => "truncate",
    }
}

fn main() -> anyhow::Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = if let Some(pos) = args.iter().position(|a| a == "--verbose" || a == "-v") {
        args.remove(pos);
        true
    } else {
        false
    };
    let width: usize = args
        .iter()
        .position(|a| a.starts_with("--width="))
        .and_then(|pos| {
            let arg = args.remove(pos);
            arg.strip_prefix("--width=").and_then(|s| s.parse().ok())
        })
        .unwrap_or(2);
    let mut args = args.into_iter();
    let (Some(input_path), Some(seed_path)) = (args.next().map(PathBuf::from), args.next().map(PathBuf::from))
    else {
        eprintln!("Usage: mutate [--width=N] [--verbose] INPUT SEED [OUTPUT]");
        std::process::exit(2);
    };
    let output_path = args.next().map(PathBuf::from);

    let input = std::fs::read(&input_path)?;
    let mut tree = MessageTree::new();
    let record = tree.new_length_prefixed("record", width, Endianness::Big);
    let root = tree.new_sequence("records", Some(record), None);
    tree.set_size(root, Some(input.len()));
    tree.set_auto_extend(root, true);
    tree.dissect_bytes(root, &input)?;
    if verbose {
        let node = tree.try_get(root)?;
        eprintln!("before:\n{}", format_tree(&node));
    }

    let seed = BufReader::new(File::open(&seed_path)?);
    let mut decisions = DecisionReader::new(IoEntropy::new(seed));
    let applied = mutate(&mut tree, root, &mut decisions, verbose)?;

    if !tree.repair(root, true)? {
        return Err(anyhow::anyhow!("cannot repair the mutated records"));
    }
    let node = tree.try_get(root)?;
    if verbose {
        eprintln!("after {} mutation(s):\n{}", applied, format_tree(&node));
    }

    let written = match &output_path {
        Some(path) => {
            let mut file = File::create(path)?;
            node.copy_to(&mut file)?
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            let n = node.copy_to(&mut lock)?;
            lock.flush()?;
            n
        }
    };
    eprintln!("{} bytes in, {} bytes out, {} mutation(s)", input.len(), written, applied);
    Ok(())
}

/// Apply mutations until the decisions say stop or the seed runs out. Returns the
/// number applied.
fn mutate<S: EntropySource>(
    tree: &mut MessageTree,
    root: NodeId,
    decisions: &mut DecisionReader<S>,
    verbose: bool,
) -> anyhow::Result<usize> {
    let records: Box<dyn msgtree::NodeFilter> = Box::new(Filter::new("", "LengthPrefixed", ""));
    let mut cursor = Cursor::new(tree, root, Some(records));
    let rounds = match decisions.exponential(1, 4) {
        Ok(n) => n + 1,
        Err(SamplerError::Exhausted) => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut applied = 0;
    for _ in 0..rounds {
        let n = cursor.scan(tree, None).len() as u64;
        if n == 0 {
            break;
        }
        let (target, mutation) = match draw(decisions, n) {
            Ok(drawn) => drawn,
            Err(SamplerError::Exhausted) => break,
            Err(e) => return Err(e.into()),
        };
        if !cursor.seek_by_index(tree, target as usize, None) {
            break;
        }
        let Some(current) = cursor.position() else {
            break;
        };
        let done = match mutation {
            Mutation::Delete => cursor.do_delete(tree),
            Mutation::Duplicate => {
                let copy = tree.clone_node(current)?;
                cursor.do_insert(tree, copy)
            }
            Mutation::Truncate => truncate_body(tree, root, current, decisions)?,
        };
        if verbose {
            let path = tree.get(current).map(|n| n.path()).unwrap_or_else(|| format!("record {}", target));
            eprintln!("{} {}: {}", mutation_name(mutation), path, if done { "ok" } else { "refused" });
        }
        applied += done as usize;
    }
    Ok(applied)
}

fn draw<S: EntropySource>(decisions: &mut DecisionReader<S>, n: u64) -> Result<(u64, Mutation), SamplerError> {
    let target = decisions.uniform(n)?;
    let mutation = match decisions.custom(&MUTATION_WEIGHTS)? {
        0 => Mutation::Delete,
        1 => Mutation::Duplicate,
        _ => Mutation::Truncate,
    };
    Ok((target, mutation))
}

/// Cut the body of `record` to a random length below its current one.
fn truncate_body<S: EntropySource>(
    tree: &mut MessageTree,
    root: NodeId,
    record: NodeId,
    decisions: &mut DecisionReader<S>,
) -> anyhow::Result<bool> {
    let Some((body, len)) = tree
        .get(record)
        .and_then(|r| r.child_by_name(LengthPrefixed::BODY))
        .map(|b| (b.id(), b.len()))
    else {
        return Ok(false);
    };
    let keep = match decisions.uniform(len as u64 + 1) {
        Ok(keep) => keep as usize,
        Err(SamplerError::Exhausted) => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    let mut cursor = Cursor::at(tree, root, body, None);
    Ok(cursor.do_truncate(tree, keep)?)
}
