// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Samplesheet checking and normalization.
//!
//! A samplesheet is a comma separated file with the header
//! `species,file,tax1,tax2,mode,uniprot` and one row per proteome. Checking
//! rejects malformed rows, rewrites spaces in species names to underscores
//! and assigns every row a sample id `<species>_T<n>`, numbering the rows of
//! each species in file order. Samples are ordered by species name.
//!
//! # Example
//! ```
//! use phylowood::config::Samplesheet;
//!
//! let sheet = Samplesheet::parse(
//!     "species,file,tax1,tax2,mode,uniprot\n\
//!      Homo sapiens,human.fa,9606,40674,proteome,UP000005640\n",
//! )
//! .unwrap();
//! assert_eq!(sheet.samples()[0].id, "Homo_sapiens_T1");
//! ```

use crate::errors::SamplesheetError;
use crate::observability::messages::validation::SampleNameSanitized;
use crate::observability::messages::StructuredLog;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const SAMPLESHEET_HEADER: [&str; 6] = ["species", "file", "tax1", "tax2", "mode", "uniprot"];

/// Populated columns every row needs.
pub const MIN_POPULATED_COLUMNS: usize = 6;

const FASTA_EXTENSIONS: [&str; 2] = [".fasta", ".fa"];

/// One checked samplesheet row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sample {
    /// `<species>_T<n>`
    pub id: String,
    pub species: String,
    pub file: String,
    pub tax1: String,
    pub tax2: String,
    pub mode: String,
    pub uniprot: String,
}

impl Sample {
    /// Column value by header name.
    pub fn column(&self, name: &str) -> Option<&str> {
        match name {
            "id" => Some(&self.id),
            "species" => Some(&self.species),
            "file" => Some(&self.file),
            "tax1" => Some(&self.tax1),
            "tax2" => Some(&self.tax2),
            "mode" => Some(&self.mode),
            "uniprot" => Some(&self.uniprot),
            _ => None,
        }
    }

    fn to_line(&self) -> String {
        [
            self.id.as_str(),
            &self.file,
            &self.tax1,
            &self.tax2,
            &self.mode,
            &self.uniprot,
        ]
        .join(",")
    }
}

/// Row fields other than the species, used for duplicate detection.
type RowInfo = [String; 5];

/// A checked samplesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Samplesheet {
    samples: Vec<Sample>,
    base_dir: PathBuf,
}

impl Samplesheet {
    /// Check samplesheet text. Relative fasta paths stay relative to the
    /// current directory.
    pub fn parse(contents: &str) -> Result<Self, SamplesheetError> {
        let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);
        let mut lines = contents.lines();

        let header: Vec<&str> = lines
            .next()
            .unwrap_or_default()
            .trim()
            .split(',')
            .map(|h| h.trim_matches('"'))
            .collect();
        if header.len() < SAMPLESHEET_HEADER.len()
            || header[..SAMPLESHEET_HEADER.len()] != SAMPLESHEET_HEADER
        {
            return Err(SamplesheetError::InvalidHeader {
                found: header.join(","),
                expected: SAMPLESHEET_HEADER.join(","),
            });
        }

        let mut by_species: BTreeMap<String, Vec<RowInfo>> = BTreeMap::new();
        for line in lines.filter(|l| !l.trim().is_empty()) {
            let (species, info) = check_row(line)?;
            let rows = by_species.entry(species).or_default();
            if rows.contains(&info) {
                return Err(SamplesheetError::DuplicateRow {
                    line: line.trim().to_string(),
                });
            }
            rows.push(info);
        }

        if by_species.is_empty() {
            return Err(SamplesheetError::NoEntries);
        }

        let samples = by_species
            .into_iter()
            .flat_map(|(species, rows)| {
                rows.into_iter().enumerate().map(move |(idx, row)| {
                    let [file, tax1, tax2, mode, uniprot] = row;
                    Sample {
                        id: format!("{}_T{}", species, idx + 1),
                        species: species.clone(),
                        file,
                        tax1,
                        tax2,
                        mode,
                        uniprot,
                    }
                })
            })
            .collect();

        Ok(Self {
            samples,
            base_dir: PathBuf::new(),
        })
    }

    /// Read and check a samplesheet file. Relative fasta paths resolve
    /// against the samplesheet's directory.
    pub fn read(path: &Path) -> Result<Self, SamplesheetError> {
        let contents = fs::read_to_string(path)?;
        let mut sheet = Self::parse(&contents)?;
        sheet.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(sheet)
    }

    /// Samples ordered by species, then file order within a species.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Location of a sample's fasta file.
    pub fn fasta_path(&self, sample: &Sample) -> PathBuf {
        self.base_dir.join(&sample.file)
    }

    /// Normalized samplesheet text: the header, then one row per sample with
    /// the sample id in the species column.
    pub fn render(&self) -> String {
        let mut out = SAMPLESHEET_HEADER.join(",");
        out.push('\n');
        for sample in &self.samples {
            out.push_str(&sample.to_line());
            out.push('\n');
        }
        out
    }

    /// Write the normalized samplesheet, creating parent directories.
    pub fn write_to(&self, path: &Path) -> Result<(), SamplesheetError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render())?;
        Ok(())
    }
}

fn check_row(line: &str) -> Result<(String, RowInfo), SamplesheetError> {
    let offending = || line.trim().to_string();
    let columns: Vec<&str> = line
        .trim()
        .split(',')
        .map(|c| c.trim().trim_matches('"'))
        .collect();

    if columns.len() < SAMPLESHEET_HEADER.len() {
        return Err(SamplesheetError::InvalidColumnCount {
            minimum: SAMPLESHEET_HEADER.len(),
            line: offending(),
        });
    }
    if columns.iter().filter(|c| !c.is_empty()).count() < MIN_POPULATED_COLUMNS {
        return Err(SamplesheetError::InvalidPopulatedColumns {
            minimum: MIN_POPULATED_COLUMNS,
            line: offending(),
        });
    }

    let mut species = columns[0].to_string();
    if species.contains(' ') {
        let sanitized = species.replace(' ', "_");
        SampleNameSanitized {
            original: &species,
            sanitized: &sanitized,
        }
        .log();
        species = sanitized;
    }
    if species.is_empty() {
        return Err(SamplesheetError::MissingSpecies { line: offending() });
    }

    let file = columns[1];
    if !file.is_empty() {
        if file.contains(' ') {
            return Err(SamplesheetError::FastaContainsSpaces { line: offending() });
        }
        if !FASTA_EXTENSIONS.iter().any(|ext| file.ends_with(ext)) {
            return Err(SamplesheetError::InvalidFastaExtension { line: offending() });
        }
    }

    let info = [
        file.to_string(),
        columns[2].to_string(),
        columns[3].to_string(),
        columns[4].to_string(),
        columns[5].to_string(),
    ];
    Ok((species, info))
}

/// Check `input` and write the normalized samplesheet to `output`.
pub fn check_samplesheet(input: &Path, output: &Path) -> Result<Samplesheet, SamplesheetError> {
    let sheet = Samplesheet::read(input)?;
    sheet.write_to(output)?;
    Ok(sheet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEADER: &str = "species,file,tax1,tax2,mode,uniprot";

    fn sheet(rows: &[&str]) -> String {
        let mut text = format!("{}\n", HEADER);
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_rejects_bad_header() {
        let err = Samplesheet::parse("sample,fastq_1,fastq_2\nx,y,z\n").unwrap_err();
        assert!(matches!(err, SamplesheetError::InvalidHeader { .. }));
        assert!(err.to_string().contains("sample,fastq_1,fastq_2 != species,file"));
    }

    #[test]
    fn test_header_may_be_quoted_and_have_bom() {
        let text = "\u{feff}\"species\",\"file\",tax1,tax2,mode,uniprot\nA,a.fa,1,2,m,U1\n";
        let parsed = Samplesheet::parse(text).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_rejects_short_rows() {
        let err = Samplesheet::parse(&sheet(&["A,a.fa,1,2"])).unwrap_err();
        assert!(matches!(err, SamplesheetError::InvalidColumnCount { minimum: 6, .. }));
    }

    #[test]
    fn test_rejects_unpopulated_columns() {
        let err = Samplesheet::parse(&sheet(&["A,a.fa,1,,m,U1"])).unwrap_err();
        assert!(matches!(
            err,
            SamplesheetError::InvalidPopulatedColumns { minimum: 6, .. }
        ));
    }

    #[test]
    fn test_spaces_in_species_become_underscores() {
        let parsed = Samplesheet::parse(&sheet(&["Homo sapiens,human.fa,1,2,m,U1"])).unwrap();
        assert_eq!(parsed.samples()[0].species, "Homo_sapiens");
        assert_eq!(parsed.samples()[0].id, "Homo_sapiens_T1");
    }

    #[test]
    fn test_fasta_checks() {
        let err = Samplesheet::parse(&sheet(&["A,my file.fa,1,2,m,U1"])).unwrap_err();
        assert!(matches!(err, SamplesheetError::FastaContainsSpaces { .. }));

        let err = Samplesheet::parse(&sheet(&["A,a.fastq,1,2,m,U1"])).unwrap_err();
        assert!(matches!(err, SamplesheetError::InvalidFastaExtension { .. }));
        assert!(err.to_string().contains("Line: 'A,a.fastq,1,2,m,U1'"));

        assert!(Samplesheet::parse(&sheet(&["A,a.fasta,1,2,m,U1"])).is_ok());
    }

    #[test]
    fn test_rejects_duplicate_rows() {
        let err = Samplesheet::parse(&sheet(&["A,a.fa,1,2,m,U1", "A,a.fa,1,2,m,U1"])).unwrap_err();
        assert!(matches!(err, SamplesheetError::DuplicateRow { .. }));
    }

    #[test]
    fn test_same_species_distinct_rows_numbered() {
        let parsed = Samplesheet::parse(&sheet(&[
            "B,b.fa,1,2,m,U1",
            "A,a1.fa,1,2,m,U1",
            "A,a2.fa,1,2,m,U1",
        ]))
        .unwrap();
        let ids: Vec<&str> = parsed.samples().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["A_T1", "A_T2", "B_T1"]);
        assert_eq!(parsed.samples()[1].file, "a2.fa");
    }

    #[test]
    fn test_rejects_empty_sheet() {
        let err = Samplesheet::parse(&format!("{}\n\n", HEADER)).unwrap_err();
        assert!(matches!(err, SamplesheetError::NoEntries));
    }

    #[test]
    fn test_check_samplesheet_writes_normalized_output() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("samplesheet.csv");
        fs::write(
            &input,
            sheet(&["Mus musculus,mouse.fa,1,2,m,U2", "Homo sapiens,human.fa,1,2,m,U1"]),
        )
        .unwrap();
        let output = dir.path().join("checked").join("samplesheet.valid.csv");

        let parsed = check_samplesheet(&input, &output).unwrap();

        assert_eq!(parsed.fasta_path(&parsed.samples()[0]), dir.path().join("human.fa"));
        let written = fs::read_to_string(&output).unwrap();
        assert_eq!(
            written,
            "species,file,tax1,tax2,mode,uniprot\n\
             Homo_sapiens_T1,human.fa,1,2,m,U1\n\
             Mus_musculus_T1,mouse.fa,1,2,m,U2\n"
        );
    }
}
