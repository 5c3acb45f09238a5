//! per-unit result tables and their merge into one wide table keyed by the zone identifier

use csv::{Reader, Writer};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::errors::{Result, ZStatsError};
use crate::zonal::{OID_FIELD, ZONE_CODE_FIELD};

/// a text table, all cells are kept as they were written
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn read_csv(path: &Path) -> Result<Table> {
        let mut rdr = Reader::from_path(path)?;
        let columns = rdr.headers()?.iter().map(|h| h.to_string()).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            rows.push(record?.iter().map(|v| v.to_string()).collect());
        }
        Ok(Table { columns, rows })
    }

    /// writes the header row followed by all rows
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut wtr = Writer::from_path(path)?;
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// removes a column and its cells, returns false if there was no such column
    pub fn drop_column(&mut self, name: &str) -> bool {
        match self.column_index(name) {
            Some(idx) => {
                self.columns.remove(idx);
                for row in &mut self.rows {
                    if idx < row.len() {
                        row.remove(idx);
                    }
                }
                true
            }
            None => false,
        }
    }

    /// values of a column, in row order
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).map(|v| v.as_str()).unwrap_or(""))
                .collect(),
        )
    }
}

/// short column names for statistics whose full name would not fit a dbf field
pub fn abbreviate(stat: &str) -> &str {
    match stat {
        "COUNT" => "CNT",
        "RANGE" => "RNG",
        "VARIETY" => "VAR",
        "MAJORITY" => "MAJ",
        "MINORITY" => "MIN",
        "MEDIAN" => "MED",
        other => other,
    }
}

/// readies a unit table for merging: drops the `OID_` and `ZONE_CODE` columns, uppercases the
/// first (key) column and renames every other column to `<STAT>_<UNITNAME>`
pub fn prepare(mut table: Table, unit_name: &str) -> Table {
    table.drop_column(OID_FIELD);
    table.drop_column(ZONE_CODE_FIELD);

    let suffix = unit_name.to_uppercase();
    table.columns = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            if i == 0 {
                name.to_uppercase()
            } else {
                format!("{}_{}", abbreviate(name), suffix).to_uppercase()
            }
        })
        .collect();
    table
}

/// inner join on `key`. Left rows keep their order, each one is repeated for every right row
/// with the same key. The key column comes first, followed by the remaining left and right columns.
/// right_name: used to report a missing key
pub fn inner_join(left: &Table, right: &Table, key: &str, right_name: &str) -> Result<Table> {
    let left_key = left
        .column_index(key)
        .ok_or_else(|| ZStatsError::MergeKeyMismatch {
            key: key.to_string(),
            table: "merged table".to_string(),
        })?;
    let right_key = right
        .column_index(key)
        .ok_or_else(|| ZStatsError::MergeKeyMismatch {
            key: key.to_string(),
            table: right_name.to_string(),
        })?;

    let mut columns = vec![key.to_string()];
    columns.extend(others(&left.columns, left_key).cloned());
    columns.extend(others(&right.columns, right_key).cloned());

    let mut right_rows: HashMap<&str, Vec<&Vec<String>>> = HashMap::new();
    for row in &right.rows {
        let k = row.get(right_key).map(|v| v.as_str()).unwrap_or("");
        right_rows.entry(k).or_default().push(row);
    }

    let mut joined = Table::new(columns);
    for lrow in &left.rows {
        let k = lrow.get(left_key).map(|v| v.as_str()).unwrap_or("");
        if let Some(matches) = right_rows.get(k) {
            for rrow in matches {
                let mut row = vec![k.to_string()];
                row.extend(others(lrow.as_slice(), left_key).cloned());
                row.extend(others(rrow.as_slice(), right_key).cloned());
                joined.rows.push(row);
            }
        }
    }
    Ok(joined)
}

fn others<T>(items: &[T], skip: usize) -> impl Iterator<Item = &T> {
    items
        .iter()
        .enumerate()
        .filter(move |(i, _)| *i != skip)
        .map(|(_, item)| item)
}

/// merges named unit tables into one table. The first table becomes the accumulator, every
/// following one is inner-joined into it on the uppercased `unique_field`.
pub fn merge_tables<I>(tables: I, unique_field: &str) -> Result<Table>
where
    I: IntoIterator<Item = (String, Table)>,
{
    let key = unique_field.to_uppercase();
    let mut merged: Option<Table> = None;

    for (name, table) in tables {
        info!("Merging table created from {}...", name);
        let table = prepare(table, &name);
        if table.column_index(&key) != Some(0) {
            return Err(ZStatsError::MergeKeyMismatch { key, table: name });
        }
        merged = Some(match merged {
            None => table,
            Some(acc) => inner_join(&acc, &table, &key, &name)?,
        });
    }

    Ok(merged.unwrap_or_else(|| Table::new(vec![key])))
}

/// reads the unit tables written to the temp directory and merges them. The file stem of each
/// table is its unit name.
pub fn merge_table_files(paths: &[PathBuf], unique_field: &str) -> Result<Table> {
    let mut tables = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        tables.push((name, Table::read_csv(path)?));
    }
    merge_tables(tables, unique_field)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|v| v.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn statistic_columns_are_abbreviated_and_suffixed() {
        let t = table(
            &[
                "OID_", "zone_id", "ZONE_CODE", "COUNT", "MEDIAN", "MEAN", "RANGE", "VARIETY",
                "MAJORITY", "MINORITY",
            ],
            &[&["1", "7", "1", "4", "2", "2.5", "3", "3", "2", "1"]],
        );
        let t = prepare(t, "foo");
        assert_eq!(
            t.columns,
            vec![
                "ZONE_ID", "CNT_FOO", "MED_FOO", "MEAN_FOO", "RNG_FOO", "VAR_FOO", "MAJ_FOO",
                "MIN_FOO"
            ]
        );
        assert_eq!(t.rows[0], vec!["7", "4", "2", "2.5", "3", "3", "2", "1"]);
    }

    #[test]
    fn prepare_without_artifact_columns() {
        let t = prepare(table(&["ID", "SUM"], &[&["1", "10"]]), "dem_band_2");
        assert_eq!(t.columns, vec!["ID", "SUM_DEM_BAND_2"]);
    }

    #[test]
    fn merge_is_an_inner_join() {
        let header = ["OID_", "ID", "ZONE_CODE", "MEAN"];
        let a = table(
            &header,
            &[&["1", "1", "1", "10"], &["2", "2", "2", "20"], &["3", "3", "3", "30"]],
        );
        let b = table(
            &header,
            &[&["1", "2", "1", "200"], &["2", "3", "2", "300"], &["3", "4", "3", "400"]],
        );

        let merged = merge_tables(vec![("a".to_string(), a), ("b".to_string(), b)], "id").unwrap();
        assert_eq!(merged.columns, vec!["ID", "MEAN_A", "MEAN_B"]);
        assert_eq!(merged.column("ID").unwrap(), vec!["2", "3"]);
        assert_eq!(merged.rows[0], vec!["2", "20", "200"]);
        assert!(merged.column_index("OID_").is_none());
        assert!(merged.column_index("ZONE_CODE").is_none());
    }

    #[test]
    fn join_keeps_left_order_and_repeats_duplicates() {
        let left = table(&["K", "X"], &[&["b", "1"], &["a", "2"]]);
        let right = table(&["K", "Y"], &[&["a", "3"], &["b", "4"], &["b", "5"]]);
        let joined = inner_join(&left, &right, "K", "right").unwrap();
        assert_eq!(joined.column("K").unwrap(), vec!["b", "b", "a"]);
        assert_eq!(joined.column("Y").unwrap(), vec!["4", "5", "3"]);
    }

    #[test]
    fn missing_key_is_reported() {
        let a = table(&["ID", "MEAN"], &[&["1", "1"]]);
        let b = table(&["OTHER", "MEAN"], &[&["1", "1"]]);
        let err = merge_tables(vec![("a".to_string(), a), ("b".to_string(), b)], "ID").unwrap_err();
        match err {
            ZStatsError::MergeKeyMismatch { key, table } => {
                assert_eq!(key, "ID");
                assert_eq!(table, "b");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn no_tables_gives_key_only_table() {
        let merged = merge_tables(Vec::new(), "spatial_id").unwrap();
        assert_eq!(merged.columns, vec!["SPATIAL_ID"]);
        assert!(merged.rows.is_empty());
    }

    #[test]
    fn csv_files_merge() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = dir.path().join("elev.csv");
        let p2 = dir.path().join("slope_band_1.csv");
        let header = ["OID_", "SPATIAL_ID", "ZONE_CODE", "COUNT"];
        table(&header, &[&["1", "A", "1", "5"], &["2", "B", "2", "6"]])
            .write_csv(&p1)
            .unwrap();
        table(&header, &[&["1", "B", "1", "7"]])
            .write_csv(&p2)
            .unwrap();

        let merged = merge_table_files(&[p1, p2], "SPATIAL_ID").unwrap();
        assert_eq!(merged.columns, vec!["SPATIAL_ID", "CNT_ELEV", "CNT_SLOPE_BAND_1"]);
        assert_eq!(merged.rows, vec![vec!["B", "6", "7"]]);

        let out = dir.path().join("out.csv");
        merged.write_csv(&out).unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(text, "SPATIAL_ID,CNT_ELEV,CNT_SLOPE_BAND_1\nB,6,7\n");
    }
}
