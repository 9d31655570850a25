use anyhow::{Context, Error};
use findr_types::Network;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write a network as a gzipped CSV edge list:
/// `source,target,posterior,qvalue`, one edge per line, strongest first.
pub fn write_edges_csv(path: impl AsRef<Path>, network: &Network) -> Result<(), Error> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| path.display().to_string())?;
    let mut writer = BufWriter::new(GzEncoder::new(file, Compression::default()));
    writeln!(writer, "source,target,posterior,qvalue")?;
    for edge in &network.edges {
        writeln!(
            writer,
            "{},{},{},{}",
            edge.source, edge.target, edge.posterior, edge.qvalue
        )?;
    }
    writer.flush()?;
    Ok(())
}
