//! Command line interface
//!
//! `genovec search` infers a vector from a domain annotation and prints
//! the closest indexed genomes; `compare` scores two indexed genomes
//! against each other; `subset` dumps cached vectors; `tokenize` batch
//! converts annotation files into corpus lines for training, parallel
//! across genomes.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::io::Write;
use std::path::PathBuf;

use crate::core::domain_sequence::{create_domain_sequence, strip_accession_version};
use crate::core::intervals::{deduplicate, remove_overlap};
use crate::index::{cosine, Norm};
use crate::io::annotations::{load_domains, AnnotationFormat};
use crate::io::taxonomy::{taxonomy_for_ids, GtdbTaxonomy, RANKS};
use crate::model::{GenomeModel, Mode};
use crate::utils::configuration::GenovecConfiguration;

#[derive(Parser)]
#[command(name = "genovec")]
#[command(about = "Genome similarity search over protein-domain embeddings")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Find the genomes most similar to an annotated query genome
    Search {
        /// Protein domain annotation of the query genome
        annotation: PathBuf,

        /// Directory holding the trained embedding models
        #[arg(short, long)]
        models: Option<PathBuf>,

        /// Model selection mode
        #[arg(short = 'M', long, value_enum)]
        mode: Option<Mode>,

        /// Annotation table format
        #[arg(short, long, value_enum, default_value = "pfamscan")]
        format: AnnotationFormat,

        /// Top n hits to return
        #[arg(short, long)]
        topn: Option<usize>,

        /// Keep only hits scoring above this threshold
        #[arg(long)]
        min_score: Option<f32>,

        /// Inference iterations per model
        #[arg(long)]
        steps: Option<usize>,

        /// Randomly drop this contiguous fraction of the domain sequence
        #[arg(long, default_value_t = 0.0)]
        truncate_by: f64,

        /// GTDB taxonomy table; hits are annotated with their lineage
        #[arg(long)]
        taxonomy: Option<PathBuf>,

        /// Output path (tsv). "-" writes to stdout
        #[arg(short, long, default_value = "-")]
        out: String,
    },

    /// Cosine similarity between two indexed genomes
    Compare {
        /// First genome accession
        a: String,

        /// Second genome accession
        b: String,

        /// Directory holding the trained embedding models
        #[arg(short, long)]
        models: Option<PathBuf>,

        /// Model selection mode
        #[arg(short = 'M', long, value_enum)]
        mode: Option<Mode>,
    },

    /// Dump cached vectors for a list of genome accessions
    Subset {
        /// Genome accessions to look up
        #[arg(required = true)]
        ids: Vec<String>,

        /// Directory holding the trained embedding models
        #[arg(short, long)]
        models: Option<PathBuf>,

        /// Model selection mode
        #[arg(short = 'M', long, value_enum)]
        mode: Option<Mode>,

        /// Output path (tsv). "-" writes to stdout
        #[arg(short, long, default_value = "-")]
        out: String,
    },

    /// Convert annotation files into corpus lines for training
    Tokenize {
        /// Annotation files, one genome each
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Annotation table format
        #[arg(short, long, value_enum, default_value = "pfamscan")]
        format: AnnotationFormat,

        /// Output path (tsv). "-" writes to stdout
        #[arg(short, long, default_value = "-")]
        out: String,
    },
}

fn open_output(path: &str) -> Result<Box<dyn Write>> {
    if path == "-" {
        Ok(Box::new(std::io::stdout().lock()))
    } else {
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create output file {path}"))?;
        Ok(Box::new(std::io::BufWriter::new(file)))
    }
}

fn load_model(
    config: &GenovecConfiguration,
    models: Option<PathBuf>,
    mode: Option<Mode>,
) -> Result<GenomeModel> {
    let model_dir = models.unwrap_or_else(|| config.models.model_dir.clone());
    let mode = match mode {
        Some(mode) => mode,
        None => config.models.mode.parse()?,
    };
    let norm: Norm = config.models.norm.parse()?;

    tracing::info!("loading model ...");
    GenomeModel::load(model_dir, mode, norm)
}

pub fn run(cli: Cli, config: &GenovecConfiguration) -> Result<()> {
    match cli.command {
        Commands::Search {
            annotation,
            models,
            mode,
            format,
            topn,
            min_score,
            steps,
            truncate_by,
            taxonomy,
            out,
        } => {
            let model = load_model(config, models, mode)?;
            let topn = topn.unwrap_or(config.search.topn);
            let steps = steps.unwrap_or(config.search.steps);
            let min_score = min_score.or(config.search.min_score);

            tracing::info!("inferring genome vector ...");
            let Some(query) = model.infer(&annotation, format, steps, truncate_by)? else {
                bail!(
                    "no usable domain records in {}, nothing to search",
                    annotation.display()
                );
            };

            let hits = model.search(&query, topn, min_score);
            let taxonomy = taxonomy.map(GtdbTaxonomy::load).transpose()?;

            let mut writer = open_output(&out)?;
            write_hits(&mut writer, &hits, taxonomy.as_ref())?;
            writer.flush()?;
            tracing::info!("done");
        }

        Commands::Compare { a, b, models, mode } => {
            let model = load_model(config, models, mode)?;
            let (Some(va), Some(vb)) = (model.vector_for(&a), model.vector_for(&b)) else {
                bail!("both accessions must be indexed (try `genovec subset {a} {b}`)");
            };
            println!("{a}\t{b}\t{:.4}", cosine(va, vb));
        }

        Commands::Subset {
            ids,
            models,
            mode,
            out,
        } => {
            let model = load_model(config, models, mode)?;
            let subset = model.subset(&ids);

            let mut writer = open_output(&out)?;
            for id in &ids {
                if let Some(v) = subset.vectors.get(id) {
                    let fields: Vec<String> = v.iter().map(|x| format!("{x}")).collect();
                    writeln!(writer, "{id}\t{}", fields.join("\t"))?;
                }
            }
            writer.flush()?;
        }

        Commands::Tokenize { inputs, format, out } => {
            tokenize(&inputs, format, &out)?;
        }
    }
    Ok(())
}

/// Write ranked hits as TSV, appending the GTDB lineage columns when a
/// taxonomy table was given. Misses are counted by [`taxonomy_for_ids`]
/// and leave the lineage columns empty.
fn write_hits(
    writer: &mut dyn Write,
    hits: &[crate::index::SearchHit],
    taxonomy: Option<&GtdbTaxonomy>,
) -> Result<()> {
    let Some(taxonomy) = taxonomy else {
        for hit in hits {
            writeln!(writer, "{}\t{:.4}", hit.id, hit.score)?;
        }
        return Ok(());
    };

    let ids: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();
    let _ = taxonomy_for_ids(taxonomy, &ids); // reports miss count

    writeln!(writer, "name\tscore\t{}", RANKS.join("\t"))?;
    for hit in hits {
        let lineage: Vec<&str> = match taxonomy.get(&hit.id) {
            Some(lineage) => RANKS
                .iter()
                .map(|rank| lineage.rank(rank).unwrap_or(""))
                .collect(),
            None => vec![""; RANKS.len()],
        };
        writeln!(writer, "{}\t{:.4}\t{}", hit.id, hit.score, lineage.join("\t"))?;
    }
    Ok(())
}

/// One corpus line per contig: `genome<TAB>contig<TAB>comma-joined
/// domains`. Genomes are independent, so the conversion runs parallel
/// across input files; a file that fails to parse is reported and
/// skipped rather than aborting the batch.
fn tokenize(inputs: &[PathBuf], format: AnnotationFormat, out: &str) -> Result<()> {
    let mut batches: Vec<(usize, Vec<String>)> = inputs
        .par_iter()
        .enumerate()
        .filter_map(|(position, path)| {
            let genome = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("genome")
                .to_string();

            let intervals = match load_domains(path, format) {
                Ok(Some(intervals)) if !intervals.is_empty() => intervals,
                Ok(_) => {
                    tracing::warn!("{}: no domain records, skipped", path.display());
                    return None;
                }
                Err(e) => {
                    tracing::warn!("{}: {e:#}, skipped", path.display());
                    return None;
                }
            };

            let resolved = remove_overlap(&intervals).to_sorted_vec();
            let resolved = deduplicate(&resolved);
            let sequence = create_domain_sequence(&resolved, true, strip_accession_version);

            let lines: Vec<String> = sequence
                .into_iter()
                .map(|(contig, tokens)| format!("{genome}\t{contig}\t{}", tokens.join(",")))
                .collect();
            Some((position, lines))
        })
        .collect();

    // par_iter gives no order guarantee; restore input order
    batches.sort_by_key(|(position, _)| *position);

    let mut writer = open_output(out)?;
    let mut genomes = 0usize;
    for (_, lines) in batches {
        genomes += 1;
        for line in lines {
            writeln!(writer, "{line}")?;
        }
    }
    writer.flush()?;

    tracing::info!("tokenized {genomes} of {} genomes", inputs.len());
    Ok(())
}
