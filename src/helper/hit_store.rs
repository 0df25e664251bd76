use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::helper::alignments::AlignmentHit;

/// Storage seam between hit accumulation and finalization.
///
/// The competitive multi-hit rescaling needs every hit of a query before any
/// contribution is final, so hits are staged here and replayed once ingestion
/// is done. Selected at construction: in-memory for typical runs, a spill
/// file when the hit set is larger than memory.
pub trait HitStore {
    fn put(&mut self, hit: AlignmentHit) -> io::Result<()>;

    /// Replays every stored hit, in insertion order.
    fn for_each(&mut self, visit: &mut dyn FnMut(&AlignmentHit)) -> io::Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct MemoryHitStore {
    hits: Vec<AlignmentHit>,
}

impl MemoryHitStore {
    pub fn new() -> Self {
        MemoryHitStore { hits: Vec::new() }
    }
}

impl HitStore for MemoryHitStore {
    fn put(&mut self, hit: AlignmentHit) -> io::Result<()> {
        self.hits.push(hit);
        Ok(())
    }

    fn for_each(&mut self, visit: &mut dyn FnMut(&AlignmentHit)) -> io::Result<()> {
        for hit in &self.hits {
            visit(hit);
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.hits.len()
    }
}

/// Spills hits to a JSON-lines file. The file is removed on drop.
#[derive(Debug)]
pub struct DiskHitStore {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    count: usize,
}

impl DiskHitStore {
    /// Creates the spill file under `temp_dir`, named per process so
    /// concurrent runs sharing a temp directory do not collide.
    pub fn create<P: AsRef<Path>>(temp_dir: P) -> io::Result<Self> {
        let path = temp_dir
            .as_ref()
            .join(format!("metaquant_hits_{}.jsonl", std::process::id()));
        let writer = BufWriter::new(File::create(&path)?);
        Ok(DiskHitStore {
            path,
            writer: Some(writer),
            count: 0,
        })
    }
}

impl HitStore for DiskHitStore {
    fn put(&mut self, hit: AlignmentHit) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "hit spill file already closed"))?;
        let line = serde_json::to_string(&hit)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(writer, "{}", line)?;
        self.count += 1;
        Ok(())
    }

    fn for_each(&mut self, visit: &mut dyn FnMut(&AlignmentHit)) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        let reader = BufReader::new(File::open(&self.path)?);
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let hit: AlignmentHit = serde_json::from_str(&line)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            visit(&hit);
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.count
    }
}

impl Drop for DiskHitStore {
    fn drop(&mut self) {
        self.writer.take();
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hit(query: &str, score: f64) -> AlignmentHit {
        AlignmentHit {
            query: query.to_string(),
            taxon: "bug1".to_string(),
            gene: "geneX".to_string(),
            reference_length: 1000,
            score,
        }
    }

    fn collect(store: &mut dyn HitStore) -> Vec<AlignmentHit> {
        let mut hits = Vec::new();
        store
            .for_each(&mut |hit| hits.push(hit.clone()))
            .unwrap();
        hits
    }

    #[test]
    fn test_memory_store_round_trip() {
        let mut store = MemoryHitStore::new();
        store.put(sample_hit("q1", 0.9)).unwrap();
        store.put(sample_hit("q2", 0.1)).unwrap();
        assert_eq!(store.len(), 2);

        let hits = collect(&mut store);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].query, "q1");
        assert_eq!(hits[1].score, 0.1);
    }

    #[test]
    fn test_disk_store_round_trip_and_cleanup() {
        let mut store = DiskHitStore::create(std::env::temp_dir()).unwrap();
        let path = store.path.clone();
        store.put(sample_hit("q1", 0.9)).unwrap();
        store.put(sample_hit("q2", 0.1)).unwrap();
        assert_eq!(store.len(), 2);

        let hits = collect(&mut store);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].query, "q1");
        assert_eq!(hits[1].query, "q2");

        drop(store);
        assert!(!path.exists());
    }
}
