//! Cost-rate tables: the base cost every margin tier stacks on.
//!
//! The core never writes cost data. It reads through `CostProvider`;
//! `CostTable` is the in-memory provider loaded from the JSON feed.
//!
//! Feed format: per category an ordered brand list, and per
//! (produto, canal) row one delimited string of costs indexed
//! positionally by that brand order, e.g. `"1.10,1.25,1.40"`.
//! Rows that use a decimal comma must delimit values with `;`.
//!
//! A comma-delimited row cannot tell `"1,10"` (two brands, 1 and 10) from
//! one value written with a decimal comma. Such a row is read as two values
//! and only caught if the brand count differs. Tokens like `05` or `00`,
//! which only appear when a decimal comma was split, are rejected.

use crate::{
    error::{MarginError, MarginResult},
    rate::Rate,
    types::CategoryId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostCell {
    pub category_id: CategoryId,
    pub bandeira:    String,
    pub produto:     String,
    pub canal:       String,
    pub base_cost:   Rate,
}

/// Read-only access to base costs.
pub trait CostProvider: Send + Sync {
    fn base_cost(
        &self,
        category_id: &str,
        bandeira: &str,
        produto: &str,
        canal: &str,
    ) -> MarginResult<Rate>;

    /// Every cell of a category, in table order.
    fn cells(&self, category_id: &str) -> MarginResult<Vec<CostCell>>;

    fn has_category(&self, category_id: &str) -> bool;
}

#[derive(Debug, Clone, Deserialize)]
struct CostTableFile {
    categories: Vec<CategoryFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryFile {
    category_id: CategoryId,
    brands:      Vec<String>,
    rows:        Vec<RowFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct RowFile {
    produto: String,
    canal:   String,
    costs:   String,
}

#[derive(Debug, Clone, Default)]
pub struct CostTable {
    categories: BTreeMap<CategoryId, Vec<CostCell>>,
}

impl CostTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let table = Self::from_json(&content)
            .map_err(|e| anyhow::anyhow!("Cannot load cost table {path}: {e}"))?;
        Ok(table)
    }

    pub fn from_json(content: &str) -> MarginResult<Self> {
        let file: CostTableFile = serde_json::from_str(content)?;
        let mut table = Self::new();
        for category in &file.categories {
            for row in &category.rows {
                table.insert_row(
                    &category.category_id,
                    &category.brands,
                    &row.produto,
                    &row.canal,
                    &row.costs,
                )?;
            }
        }
        log::debug!("cost table loaded: {} categories", table.categories.len());
        Ok(table)
    }

    /// Add one (produto, canal) row: one cell per brand.
    pub fn insert_row(
        &mut self,
        category_id: &str,
        brands: &[String],
        produto: &str,
        canal: &str,
        costs: &str,
    ) -> MarginResult<()> {
        for (bandeira, base_cost) in parse_brand_costs(costs, brands)? {
            self.insert(CostCell {
                category_id: category_id.to_string(),
                bandeira,
                produto: produto.to_string(),
                canal: canal.to_string(),
                base_cost,
            });
        }
        Ok(())
    }

    /// Insert or replace a single cell.
    pub fn insert(&mut self, cell: CostCell) {
        let cells = self.categories.entry(cell.category_id.clone()).or_default();
        match cells.iter_mut().find(|c| {
            c.bandeira == cell.bandeira && c.produto == cell.produto && c.canal == cell.canal
        }) {
            Some(existing) => existing.base_cost = cell.base_cost,
            None => cells.push(cell),
        }
    }
}

impl CostProvider for CostTable {
    fn base_cost(
        &self,
        category_id: &str,
        bandeira: &str,
        produto: &str,
        canal: &str,
    ) -> MarginResult<Rate> {
        self.categories
            .get(category_id)
            .and_then(|cells| {
                cells.iter().find(|c| {
                    c.bandeira == bandeira && c.produto == produto && c.canal == canal
                })
            })
            .map(|c| c.base_cost)
            .ok_or_else(|| {
                MarginError::not_found(format!(
                    "cost cell {category_id}/{bandeira}/{produto}/{canal}"
                ))
            })
    }

    fn cells(&self, category_id: &str) -> MarginResult<Vec<CostCell>> {
        self.categories
            .get(category_id)
            .cloned()
            .ok_or_else(|| MarginError::not_found(format!("cost category {category_id}")))
    }

    fn has_category(&self, category_id: &str) -> bool {
        self.categories.contains_key(category_id)
    }
}

/// Split a positional per-brand cost list and pair it with the brand order.
pub fn parse_brand_costs(line: &str, brands: &[String]) -> MarginResult<Vec<(String, Rate)>> {
    let delimiter = if line.contains(';') { ';' } else { ',' };
    let values: Vec<&str> = line.split(delimiter).map(str::trim).collect();
    if delimiter == ',' {
        if let Some(bad) = values.iter().find(|v| looks_like_split_decimal(v)) {
            return Err(MarginError::invalid(format!(
                "cost row '{line}' has '{bad}': decimal commas need ';' between values"
            )));
        }
    }
    if values.len() != brands.len() {
        return Err(MarginError::invalid(format!(
            "cost row has {} values for {} brands",
            values.len(),
            brands.len()
        )));
    }
    brands
        .iter()
        .zip(values)
        .map(|(brand, raw)| {
            let cost = Rate::parse(raw)?;
            if cost.is_negative() {
                return Err(MarginError::invalid(format!("negative base cost for {brand}")));
            }
            Ok((brand.clone(), cost))
        })
        .collect()
}

/// `05`, `007`: a leading zero before more digits and no decimal point.
fn looks_like_split_decimal(token: &str) -> bool {
    let digits = token.strip_suffix('%').unwrap_or(token);
    digits.len() > 1
        && digits.starts_with('0')
        && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brands(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn row_delimiter_follows_content() {
        let b = brands(&["visa", "master", "elo"]);
        let dotted = parse_brand_costs("1.10,1.25,1.40", &b).unwrap();
        assert_eq!(dotted[2], ("elo".to_string(), Rate::parse("1.4").unwrap()));

        let commas = parse_brand_costs("1,10; 1,25; 1,40", &b).unwrap();
        assert_eq!(commas, dotted);
    }

    #[test]
    fn row_must_match_brand_count() {
        let b = brands(&["visa", "master"]);
        assert!(parse_brand_costs("1.10,1.25,1.40", &b).is_err());
        assert!(parse_brand_costs("1.10", &b).is_err());
        assert!(parse_brand_costs("1.10,-0.5", &b).is_err());
        assert!(parse_brand_costs("1.10,abc", &b).is_err());
    }

    #[test]
    fn split_decimal_comma_rejected() {
        let b = brands(&["visa", "master"]);
        for row in ["1,05", "2,00", "3,07"] {
            assert!(
                matches!(parse_brand_costs(row, &b), Err(MarginError::Validation { .. })),
                "'{row}' should be rejected"
            );
        }
        // Plain integers and dot decimals stay valid in comma rows.
        assert!(parse_brand_costs("0,10", &b).is_ok());
        assert!(parse_brand_costs("0.05,1.5", &b).is_ok());
        assert_eq!(
            parse_brand_costs("1,05;2,25", &b).unwrap()[0].1,
            Rate::parse("1.05").unwrap()
        );
    }

    #[test]
    fn feed_loads_in_table_order() {
        let table = CostTable::from_json(
            r#"{ "categories": [
                { "categoryId": "cat-1", "brands": ["visa", "master"],
                  "rows": [
                    { "produto": "credito", "canal": "pos", "costs": "2.10,2.30" },
                    { "produto": "debito",  "canal": "pos", "costs": "0,90;1,05" }
                  ] }
            ] }"#,
        )
        .unwrap();

        assert!(table.has_category("cat-1"));
        assert!(!table.has_category("cat-2"));
        let order: Vec<_> = table
            .cells("cat-1")
            .unwrap()
            .into_iter()
            .map(|c| format!("{}/{}", c.bandeira, c.produto))
            .collect();
        assert_eq!(order, ["visa/credito", "master/credito", "visa/debito", "master/debito"]);
        assert_eq!(
            table.base_cost("cat-1", "master", "debito", "pos").unwrap(),
            Rate::parse("1.05").unwrap()
        );
        assert!(matches!(
            table.base_cost("cat-1", "amex", "debito", "pos"),
            Err(MarginError::NotFound { .. })
        ));
    }

    #[test]
    fn insert_replaces_existing_cell() {
        let mut table = CostTable::new();
        let b = brands(&["visa"]);
        table.insert_row("cat-1", &b, "credito", "pos", "2").unwrap();
        table.insert_row("cat-1", &b, "credito", "pos", "3").unwrap();
        assert_eq!(table.cells("cat-1").unwrap().len(), 1);
        assert_eq!(
            table.base_cost("cat-1", "visa", "credito", "pos").unwrap(),
            Rate::parse("3").unwrap()
        );
    }
}
