// Command line utility for running findr analyses over Arrow tables

use anyhow::{Context, Error};
use arrow_io::{read_expression, read_genotypes, read_pairs, write_edges_csv};
use clap::{value_parser, Arg, ArgMatches, Command};
use findr::{association, causal, coexpression, Combination, FindrOptions, FitMethod};
use findr_types::Network;
use log::info;
use std::path::PathBuf;

fn expression_arg() -> Arg {
    Arg::new("EXPRESSION")
        .help("Arrow file with the samples-by-genes expression table")
        .required(true)
        .value_parser(value_parser!(PathBuf))
}

fn genotype_arg() -> Arg {
    Arg::new("GENOTYPES")
        .help("Arrow file with the samples-by-variants genotype table")
        .required(true)
        .value_parser(value_parser!(PathBuf))
}

fn common_args() -> Vec<Arg> {
    vec![
        Arg::new("OUT")
            .help("Output edge list (gzipped CSV)")
            .short('o')
            .long("out")
            .default_value("network.csv.gz")
            .value_parser(value_parser!(PathBuf)),
        Arg::new("METHOD")
            .help("Posterior estimation method")
            .long("method")
            .default_value("mom")
            .value_parser(["mom", "kde"]),
        Arg::new("FDR")
            .help("Drop edges with q-value above this threshold")
            .long("fdr")
            .value_parser(value_parser!(f64)),
        Arg::new("COLS")
            .help("Comma-separated source column names to test")
            .long("cols"),
    ]
}

pub fn main() -> Result<(), Error> {
    env_logger::init();

    let matches = Command::new("findr-cmd")
        .about("Causal gene network inference from expression and eQTL data")
        .subcommand_required(true)
        .subcommand(
            Command::new("coex")
                .about("Coexpression posteriors, all-vs-all or restricted sources")
                .arg(expression_arg())
                .args(common_args()),
        )
        .subcommand(
            Command::new("assoc")
                .about("eQTL-to-gene association posteriors")
                .arg(expression_arg())
                .arg(genotype_arg())
                .args(common_args()),
        )
        .subcommand(
            Command::new("causal")
                .about("eQTL-instrumented causal inference over a cis pair table")
                .arg(expression_arg())
                .arg(genotype_arg())
                .arg(
                    Arg::new("PAIRS")
                        .help("Arrow file with the cis gene/variant pair table")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("COMBINATION")
                        .help("How the causal tests combine into one probability")
                        .long("combination")
                        .default_value("orig")
                        .value_parser(["iv", "mediation", "orig"]),
                )
                .args(common_args()),
        )
        .get_matches();

    let (network, out) = match matches.subcommand() {
        Some(("coex", sub)) => {
            let opts = options_from(sub)?;
            let x = read_expression(required_path(sub, "EXPRESSION"))?;
            let table = coexpression(&x, &opts)?;
            (table.network(opts.fdr), out_path(sub))
        }
        Some(("assoc", sub)) => {
            let opts = options_from(sub)?;
            let x = read_expression(required_path(sub, "EXPRESSION"))?;
            let g = read_genotypes(required_path(sub, "GENOTYPES"))?;
            let table = association(&x, &g, &opts)?;
            (table.posteriors.network(opts.fdr), out_path(sub))
        }
        Some(("causal", sub)) => {
            let mut opts = options_from(sub)?;
            opts.combination = sub.get_one::<String>("COMBINATION").unwrap().parse::<Combination>()?;
            let x = read_expression(required_path(sub, "EXPRESSION"))?;
            let g = read_genotypes(required_path(sub, "GENOTYPES"))?;
            let pairs = read_pairs(required_path(sub, "PAIRS"))?;
            let table = causal(&x, &g, &pairs, &opts)?;
            (table.network(opts.combination, opts.fdr)?, out_path(sub))
        }
        _ => unreachable!("subcommand is required"),
    };

    report(&network);
    write_edges_csv(&out, &network).with_context(|| out.display().to_string())?;
    Ok(())
}

fn required_path<'a>(matches: &'a ArgMatches, name: &str) -> &'a PathBuf {
    matches.get_one(name).unwrap()
}

fn out_path(matches: &ArgMatches) -> PathBuf {
    required_path(matches, "OUT").clone()
}

fn options_from(matches: &ArgMatches) -> Result<FindrOptions, Error> {
    let method: FitMethod = matches.get_one::<String>("METHOD").unwrap().parse()?;
    let fdr = matches.get_one::<f64>("FDR").copied();
    let colnames = matches
        .get_one::<String>("COLS")
        .map(|s| s.split(',').map(str::to_string).collect());
    Ok(FindrOptions {
        method,
        fdr,
        colnames,
        ..Default::default()
    })
}

fn report(network: &Network) {
    info!("{} edges", network.len());
    if let Some(edge) = network.edges.first() {
        info!(
            "strongest edge: {} -> {} (posterior {:.4}, q {:.4})",
            edge.source, edge.target, edge.posterior, edge.qvalue
        );
    }
}
