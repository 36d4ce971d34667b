//! Shared primitive types used across the margin core.

use serde::{Deserialize, Serialize};

/// An ISO (reseller) identifier.
pub type CustomerId = String;

/// An authenticated user identifier.
pub type ActorId = String;

/// A cost-table category identifier.
pub type CategoryId = String;

/// Primary key of an `mdr_link` row.
pub type LinkId = i64;

/// The identifying key of one priceable item.
///
/// Not persisted on its own: it is the join of a cost cell with the
/// ISO's margin configuration (or its override).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateCell {
    pub customer_id: CustomerId,
    pub category_id: CategoryId,
    pub bandeira:    String,
    pub produto:     String,
    pub canal:       String,
}

impl RateCell {
    pub fn new(
        customer_id: impl Into<String>,
        category_id: impl Into<String>,
        bandeira: impl Into<String>,
        produto: impl Into<String>,
        canal: impl Into<String>,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            category_id: category_id.into(),
            bandeira:    bandeira.into(),
            produto:     produto.into(),
            canal:       canal.into(),
        }
    }
}

impl std::fmt::Display for RateCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.customer_id, self.category_id, self.bandeira, self.produto, self.canal
        )
    }
}
