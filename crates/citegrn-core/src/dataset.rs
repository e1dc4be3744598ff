//! Citation dataset loaders.
//!
//! Two on-disk layouts are understood:
//!
//! | Layout | Files | Datasets |
//! |--------|-------|----------|
//! | Planetoid raw | `<name>.content`, `<name>.cites` | Cora, Citeseer (and Pubmed if converted) |
//! | Pubmed-Diabetes | `Pubmed-Diabetes.NODE.paper.tab`, `Pubmed-Diabetes.DIRECTED.cites.tab` | Pubmed |
//!
//! `.content` rows are `paper_id f_1 ... f_F class`; `.cites` rows are
//! `cited citing`. Class names are indexed in sorted order.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{CitationGraph, Error, Result};

const PUBMED_NODES: &str = "Pubmed-Diabetes.NODE.paper.tab";
const PUBMED_CITES: &str = "Pubmed-Diabetes.DIRECTED.cites.tab";

/// Supported citation benchmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetName {
    Cora,
    Citeseer,
    Pubmed,
}

impl DatasetName {
    /// File stem used by the Planetoid layout.
    pub fn file_stem(self) -> &'static str {
        match self {
            Self::Cora => "cora",
            Self::Citeseer => "citeseer",
            Self::Pubmed => "pubmed",
        }
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

impl FromStr for DatasetName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cora" => Ok(Self::Cora),
            "citeseer" => Ok(Self::Citeseer),
            "pubmed" => Ok(Self::Pubmed),
            _ => Err(Error::UnknownDataset(s.to_string())),
        }
    }
}

/// Options applied while loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Divide each feature row by its sum (default: true).
    pub normalize_features: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            normalize_features: true,
        }
    }
}

/// A node-classification dataset: features, labels and the citation graph.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: DatasetName,
    /// Node features, `(num_nodes, num_features)`.
    pub features: Array2<f32>,
    /// Class index per node.
    pub labels: Vec<u32>,
    /// Class names, indexed by label.
    pub classes: Vec<String>,
    /// Original paper ids, indexed by node.
    pub paper_ids: Vec<String>,
    pub graph: CitationGraph,
}

/// Rows parsed from a node file, before labels are indexed.
struct RawNodes {
    ids: Vec<String>,
    features: Vec<f32>,
    num_features: usize,
    classes: Vec<String>,
}

impl Dataset {
    /// Load `name` from `dir`, choosing the file layout present on disk.
    pub fn load(dir: impl AsRef<Path>, name: DatasetName, options: &LoadOptions) -> Result<Self> {
        let dir = dir.as_ref();
        let pubmed_layout = name == DatasetName::Pubmed && dir.join(PUBMED_NODES).exists();

        let (raw, edges_path) = if pubmed_layout {
            (
                read_pubmed_nodes(&dir.join(PUBMED_NODES))?,
                dir.join(PUBMED_CITES),
            )
        } else {
            let stem = name.file_stem();
            (
                read_planetoid_content(&dir.join(format!("{stem}.content")))?,
                dir.join(format!("{stem}.cites")),
            )
        };

        let index: HashMap<&str, usize> = raw
            .ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let pairs = if pubmed_layout {
            read_pubmed_cites(&edges_path)?
        } else {
            read_planetoid_cites(&edges_path)?
        };

        let mut graph = CitationGraph::new(raw.ids.len());
        let mut skipped = 0usize;
        for (a, b) in &pairs {
            match (index.get(a.as_str()), index.get(b.as_str())) {
                (Some(&ia), Some(&ib)) => {
                    graph.add_edge(ia, ib)?;
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(
                dataset = %name,
                skipped,
                "citations reference unknown papers and were dropped"
            );
        }

        let num_nodes = raw.ids.len();
        let got = raw.features.len();
        let features = Array2::from_shape_vec((num_nodes, raw.num_features), raw.features)
            .map_err(|_| Error::DimensionMismatch {
                expected: num_nodes * raw.num_features,
                got,
            })?;

        let classes: Vec<String> = raw
            .classes
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let class_index: HashMap<&str, u32> = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i as u32))
            .collect();
        let labels = raw
            .classes
            .iter()
            .map(|c| class_index[c.as_str()])
            .collect();

        let mut dataset = Self {
            name,
            features,
            labels,
            classes,
            paper_ids: raw.ids,
            graph,
        };
        if options.normalize_features {
            normalize_rows(&mut dataset.features);
        }

        info!(
            dataset = %name,
            nodes = dataset.num_nodes(),
            edges = dataset.graph.num_edges(),
            features = dataset.num_features(),
            classes = dataset.num_classes(),
            "loaded dataset"
        );
        Ok(dataset)
    }

    /// Assemble a dataset from in-memory parts.
    ///
    /// Class names default to the label ids.
    pub fn from_parts(
        name: DatasetName,
        features: Array2<f32>,
        labels: Vec<u32>,
        graph: CitationGraph,
    ) -> Result<Self> {
        let n = features.nrows();
        if labels.len() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                got: labels.len(),
            });
        }
        if graph.num_nodes() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                got: graph.num_nodes(),
            });
        }
        let num_classes = labels.iter().max().map_or(0, |&m| m as usize + 1);
        Ok(Self {
            name,
            features,
            labels,
            classes: (0..num_classes).map(|c| c.to_string()).collect(),
            paper_ids: (0..n).map(|i| i.to_string()).collect(),
            graph,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.features.nrows()
    }

    pub fn num_features(&self) -> usize {
        self.features.ncols()
    }

    /// `max(label) + 1`.
    pub fn num_classes(&self) -> usize {
        self.labels.iter().max().map_or(0, |&m| m as usize + 1)
    }

    /// Node count per class.
    pub fn class_histogram(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_classes()];
        for &label in &self.labels {
            counts[label as usize] += 1;
        }
        counts
    }
}

/// Divide each row by its sum; all-zero rows are left alone.
pub fn normalize_rows(features: &mut Array2<f32>) {
    for mut row in features.rows_mut() {
        let sum = row.sum();
        if sum != 0.0 {
            row /= sum;
        }
    }
}

fn open_lines(path: &Path) -> Result<impl Iterator<Item = (usize, Result<String>)>> {
    let file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let owned: PathBuf = path.to_path_buf();
    Ok(BufReader::new(file)
        .lines()
        .enumerate()
        .map(move |(i, line)| {
            let line = line.map_err(|source| Error::Io {
                path: owned.clone(),
                source,
            });
            (i + 1, line)
        }))
}

fn read_planetoid_content(path: &Path) -> Result<RawNodes> {
    let mut raw = RawNodes {
        ids: Vec::new(),
        features: Vec::new(),
        num_features: 0,
        classes: Vec::new(),
    };
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (lineno, line) in open_lines(path)? {
        let line = line?;
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.is_empty() {
            continue;
        }
        if cols.len() < 3 {
            return Err(Error::parse(path, lineno, "expected id, features and class"));
        }

        let width = cols.len() - 2;
        if raw.ids.is_empty() {
            raw.num_features = width;
        } else if width != raw.num_features {
            return Err(Error::parse(
                path,
                lineno,
                format!("expected {} features, found {}", raw.num_features, width),
            ));
        }

        let id = cols[0].to_string();
        if seen.insert(id.clone(), lineno).is_some() {
            return Err(Error::parse(path, lineno, format!("duplicate paper id {id}")));
        }

        for value in &cols[1..cols.len() - 1] {
            let v: f32 = value
                .parse()
                .map_err(|_| Error::parse(path, lineno, format!("bad feature value {value:?}")))?;
            raw.features.push(v);
        }
        raw.ids.push(id);
        raw.classes.push(cols[cols.len() - 1].to_string());
    }

    debug!(path = %path.display(), rows = raw.ids.len(), "read content file");
    Ok(raw)
}

fn read_planetoid_cites(path: &Path) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for (lineno, line) in open_lines(path)? {
        let line = line?;
        let cols: Vec<&str> = line.split_whitespace().collect();
        match cols.as_slice() {
            [] => continue,
            [cited, citing] => pairs.push((cited.to_string(), citing.to_string())),
            _ => return Err(Error::parse(path, lineno, "expected `cited citing`")),
        }
    }
    Ok(pairs)
}

fn read_pubmed_nodes(path: &Path) -> Result<RawNodes> {
    let mut lines = open_lines(path)?;

    // Header 1 is the table name; header 2 declares the feature columns.
    if let Some((_, line)) = lines.next() {
        line?;
    }
    let (lineno, header) = lines
        .next()
        .ok_or_else(|| Error::parse(path, 2, "missing feature header"))?;
    let header = header?;
    let mut columns: HashMap<String, usize> = HashMap::new();
    for field in header.split('\t') {
        let mut parts = field.split(':');
        if parts.next() == Some("numeric") {
            let word = parts
                .next()
                .ok_or_else(|| Error::parse(path, lineno, format!("bad column {field:?}")))?;
            let next = columns.len();
            columns.entry(word.to_string()).or_insert(next);
        }
    }

    let num_features = columns.len();
    let mut raw = RawNodes {
        ids: Vec::new(),
        features: Vec::new(),
        num_features,
        classes: Vec::new(),
    };

    for (lineno, line) in lines {
        let line = line?;
        let mut fields = line.split('\t').filter(|f| !f.is_empty());
        let Some(id) = fields.next() else { continue };
        let label = fields
            .next()
            .and_then(|f| f.strip_prefix("label="))
            .ok_or_else(|| Error::parse(path, lineno, "missing label= column"))?;

        let mut row = vec![0f32; num_features];
        for field in fields {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| Error::parse(path, lineno, format!("bad field {field:?}")))?;
            if key == "summary" {
                continue;
            }
            let col = *columns
                .get(key)
                .ok_or_else(|| Error::parse(path, lineno, format!("unknown feature {key:?}")))?;
            row[col] = value
                .parse()
                .map_err(|_| Error::parse(path, lineno, format!("bad feature value {value:?}")))?;
        }

        raw.ids.push(id.to_string());
        raw.classes.push(label.to_string());
        raw.features.extend_from_slice(&row);
    }

    debug!(path = %path.display(), rows = raw.ids.len(), "read pubmed node table");
    Ok(raw)
}

fn read_pubmed_cites(path: &Path) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for (lineno, line) in open_lines(path)?.skip(2) {
        let line = line?;
        let fields: Vec<&str> = line.split('\t').filter(|f| !f.is_empty()).collect();
        match fields.as_slice() {
            [] => continue,
            [_, a, "|", b] => {
                let a = a.trim_start_matches("paper:");
                let b = b.trim_start_matches("paper:");
                pairs.push((a.to_string(), b.to_string()));
            }
            _ => {
                return Err(Error::parse(
                    path,
                    lineno,
                    "expected `id paper:<a> | paper:<b>`",
                ))
            }
        }
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_cora(dir: &Path) {
        fs::write(
            dir.join("cora.content"),
            "p1\t1\t0\t1\tNeural\n\
             p2\t0\t1\t0\tTheory\n\
             p3\t0\t0\t0\tNeural\n",
        )
        .unwrap();
        fs::write(dir.join("cora.cites"), "p1\tp2\np2\tp1\np3\tp2\np3\tghost\n").unwrap();
    }

    #[test]
    fn test_dataset_name_parsing() {
        assert_eq!("Cora".parse::<DatasetName>().unwrap(), DatasetName::Cora);
        assert_eq!("PUBMED".parse::<DatasetName>().unwrap(), DatasetName::Pubmed);
        assert!("imagenet".parse::<DatasetName>().is_err());
        assert_eq!(DatasetName::Citeseer.to_string(), "citeseer");
    }

    #[test]
    fn test_load_planetoid_layout() {
        let dir = tempfile::tempdir().unwrap();
        write_cora(dir.path());

        let ds = Dataset::load(dir.path(), DatasetName::Cora, &LoadOptions::default()).unwrap();
        assert_eq!(ds.num_nodes(), 3);
        assert_eq!(ds.num_features(), 3);
        assert_eq!(ds.classes, vec!["Neural", "Theory"]);
        assert_eq!(ds.labels, vec![0, 1, 0]);
        assert_eq!(ds.paper_ids, vec!["p1", "p2", "p3"]);
        // p1-p2 twice collapses, p3-ghost is dropped.
        assert_eq!(ds.graph.num_edges(), 2);
        assert!(ds.graph.has_edge(2, 1));

        assert!((ds.features[[0, 0]] - 0.5).abs() < 1e-6);
        assert_eq!(ds.features.row(2).sum(), 0.0);
    }

    #[test]
    fn test_load_without_normalization() {
        let dir = tempfile::tempdir().unwrap();
        write_cora(dir.path());

        let options = LoadOptions {
            normalize_features: false,
        };
        let ds = Dataset::load(dir.path(), DatasetName::Cora, &options).unwrap();
        assert_eq!(ds.features[[0, 0]], 1.0);
        assert_eq!(ds.features[[0, 2]], 1.0);
    }

    #[test]
    fn test_ragged_content_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cora.content"), "a 1 0 X\nb 1 Y\n").unwrap();
        fs::write(dir.path().join("cora.cites"), "").unwrap();

        let err = Dataset::load(dir.path(), DatasetName::Cora, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));
    }

    #[test]
    fn test_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let err =
            Dataset::load(dir.path(), DatasetName::Citeseer, &LoadOptions::default()).unwrap_err();
        assert!(err.to_string().contains("citeseer.content"));
    }

    #[test]
    fn test_load_pubmed_layout() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(PUBMED_NODES),
            "NODE\tpaper\n\
             cat=1,2,3:label\tnumeric:w-rat:0.0\tnumeric:w-cell:0.0\tstring:summary\n\
             11\tlabel=1\tw-rat=0.5\tsummary=w-rat\n\
             22\tlabel=3\tw-cell=0.25\tw-rat=0.75\tsummary=w-cell,w-rat\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(PUBMED_CITES),
            "DIRECTED\tcites\n\
             NO_FEATURES\n\
             1\tpaper:11\t|\tpaper:22\n",
        )
        .unwrap();

        let options = LoadOptions {
            normalize_features: false,
        };
        let ds = Dataset::load(dir.path(), DatasetName::Pubmed, &options).unwrap();
        assert_eq!(ds.num_nodes(), 2);
        assert_eq!(ds.num_features(), 2);
        assert_eq!(ds.labels, vec![0, 1]);
        assert_eq!(ds.features[[1, 0]], 0.75);
        assert_eq!(ds.features[[1, 1]], 0.25);
        assert!(ds.graph.has_edge(0, 1));
    }

    #[test]
    fn test_pubmed_unreadable_title_header_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut nodes = b"NODE\xff\xfepaper\n".to_vec();
        nodes.extend_from_slice(
            b"cat=1,2,3:label\tnumeric:w-rat:0.0\tstring:summary\n\
              11\tlabel=1\tw-rat=0.5\tsummary=w-rat\n",
        );
        fs::write(dir.path().join(PUBMED_NODES), nodes).unwrap();
        fs::write(dir.path().join(PUBMED_CITES), "DIRECTED\tcites\nNO_FEATURES\n").unwrap();

        let err =
            Dataset::load(dir.path(), DatasetName::Pubmed, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Io { .. }), "unexpected error: {err}");
        assert!(err.to_string().contains(PUBMED_NODES));
    }

    #[test]
    fn test_from_parts_validates_shapes() {
        let features = Array2::zeros((3, 2));
        let graph = CitationGraph::new(3);
        assert!(Dataset::from_parts(DatasetName::Cora, features.clone(), vec![0, 1], graph.clone())
            .is_err());

        let ds = Dataset::from_parts(DatasetName::Cora, features, vec![0, 2, 2], graph).unwrap();
        assert_eq!(ds.num_classes(), 3);
        assert_eq!(ds.class_histogram(), vec![1, 0, 2]);
    }
}
