//! Per-output and per-address figures shown next to each coin, and the sort rules.

use std::{cmp::Ordering, str::FromStr};

use bitcoin::{Amount, Network, OutPoint};
use serde::Serialize;

use crate::{
    coins::{resolve_address, CoinList, KeyShape, PubKeyLookup},
    estimate::{output_priority, FeePolicy, PriorityLabel, ROW_BASE_BYTES, UNCOMPRESSED_PRIORITY_EXTRA},
    selection::SelectionStore,
};

/// One candidate output as displayed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoinRow {
    /// The output.
    pub outpoint: OutPoint,
    /// Output value.
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub value: Amount,
    /// Confirmations.
    pub depth: u32,
    /// Transaction time.
    pub time: u64,
    /// Address the script pays to, empty when it has none.
    pub address: String,
    /// Paid to an address other than the owning one.
    pub is_change: bool,
    /// Locked against spending.
    pub locked: bool,
    /// Currently selected.
    pub selected: bool,
    /// Priority if spent alone.
    pub priority: f64,
    /// Label of [`CoinRow::priority`].
    pub priority_label: PriorityLabel,
}

/// Check state of an address group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupCheck {
    /// Nothing in the group is selected.
    Unchecked,
    /// Some but not all outputs are selected.
    Partial,
    /// Every output is selected.
    Checked,
}

/// All outputs of one owning address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressGroup {
    /// Owning address.
    pub address: String,
    /// Number of outputs.
    pub count: usize,
    /// Sum of output values.
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub value: Amount,
    /// Priority of spending the whole group.
    pub priority: f64,
    /// Label of [`AddressGroup::priority`].
    pub priority_label: PriorityLabel,
    /// Selection state of the group.
    pub check: GroupCheck,
    /// The outputs.
    pub rows: Vec<CoinRow>,
}

/// Builds the grouped view of `coins`.
///
/// Locked outputs are unselected on the way.
pub fn build_view(
    coins: &CoinList,
    store: &mut SelectionStore,
    keys: &impl PubKeyLookup,
    policy: &FeePolicy,
    network: Network,
) -> Vec<AddressGroup> {
    let label = |priority: f64| PriorityLabel::classify(priority, |p| policy.allows_free(p));

    coins
        .groups()
        .map(|(group_address, outputs)| {
            let mut value = Amount::ZERO;
            let mut priority_inputs = 0.0;
            let mut extra_bytes = 0;
            let mut rows = Vec::with_capacity(outputs.len());

            for output in outputs {
                let shape = KeyShape::resolve(&output.script_pubkey, keys);
                if shape == KeyShape::Uncompressed {
                    extra_bytes += UNCOMPRESSED_PRIORITY_EXTRA;
                }

                let locked = store.is_locked(&output.outpoint);
                if locked {
                    store.unselect(&output.outpoint);
                }

                let address = resolve_address(&output.script_pubkey, network).unwrap_or_default();
                let priority = output_priority(output, shape);

                value = value.checked_add(output.value).unwrap_or(Amount::MAX_MONEY);
                priority_inputs += output.value.to_sat() as f64 * (output.depth as f64 + 1.0);

                rows.push(CoinRow {
                    outpoint: output.outpoint,
                    value: output.value,
                    depth: output.depth,
                    time: output.time,
                    is_change: address != group_address,
                    address,
                    locked,
                    selected: store.is_selected(&output.outpoint),
                    priority,
                    priority_label: label(priority),
                });
            }

            let selected = rows.iter().filter(|row| row.selected).count();
            let check = match selected {
                0 => GroupCheck::Unchecked,
                n if n == rows.len() => GroupCheck::Checked,
                _ => GroupCheck::Partial,
            };
            let priority = priority_inputs / (extra_bytes + ROW_BASE_BYTES) as f64;

            AddressGroup {
                address: group_address.to_string(),
                count: rows.len(),
                value,
                priority,
                priority_label: label(priority),
                check,
                rows,
            }
        })
        .collect()
}

/// Sortable columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    /// Output value.
    Amount,
    /// Address string.
    Address,
    /// Transaction time.
    Date,
    /// Confirmations.
    Confirmations,
    /// Row priority.
    Priority,
}

impl FromStr for SortColumn {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "amount" => SortColumn::Amount,
            "address" => SortColumn::Address,
            "date" => SortColumn::Date,
            "confirmations" => SortColumn::Confirmations,
            "priority" => SortColumn::Priority,
            _ => return Err("unknown sort column"),
        })
    }
}

impl SortColumn {
    /// Order used when a column is first picked: largest, newest and best first for
    /// the numeric columns, alphabetical otherwise.
    pub fn default_order(&self) -> SortOrder {
        match self {
            SortColumn::Address => SortOrder::Ascending,
            SortColumn::Amount
            | SortColumn::Date
            | SortColumn::Confirmations
            | SortColumn::Priority => SortOrder::Descending,
        }
    }

    fn compare(&self, a: &CoinRow, b: &CoinRow) -> Ordering {
        match self {
            SortColumn::Amount => a.value.cmp(&b.value),
            SortColumn::Address => a.address.cmp(&b.address),
            SortColumn::Date => a.time.cmp(&b.time),
            SortColumn::Confirmations => a.depth.cmp(&b.depth),
            SortColumn::Priority => a.priority.total_cmp(&b.priority),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

impl SortOrder {
    fn flipped(self) -> Self {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }
}

/// Current sort column and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortState {
    /// Sorted column.
    pub column: SortColumn,
    /// Direction.
    pub order: SortOrder,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            column: SortColumn::Amount,
            order: SortOrder::Descending,
        }
    }
}

impl SortState {
    /// Header click: toggles the direction on the current column, or switches column
    /// using its default direction.
    pub fn click(&mut self, column: SortColumn) {
        if self.column == column {
            self.order = self.order.flipped();
        } else {
            self.column = column;
            self.order = column.default_order();
        }
    }

    /// Stable sort of rows.
    pub fn sort_rows(&self, rows: &mut [CoinRow]) {
        rows.sort_by(|a, b| {
            let ordering = self.column.compare(a, b);
            match self.order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });
    }

    /// Sorts the rows inside every group.
    pub fn sort_groups(&self, groups: &mut [AddressGroup]) {
        for group in groups {
            self.sort_rows(&mut group.rows);
        }
    }
}
