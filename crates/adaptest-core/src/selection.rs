//! Item selection by maximum (expected) Fisher information.
//!
//! Selection is a pure query over the bank: it never marks anything as used.

use serde::{Deserialize, Serialize};

use crate::bank::ItemBank;
use crate::irt::{item_information, probability};
use crate::model::{Item, ItemParams, SelectionMethod};
use crate::posterior::Posterior;

/// Scores closer than this are treated as ties.
const TIE_TOLERANCE: f64 = 1e-12;

/// The chosen item and its diagnostics at the current theta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSelection {
    pub item: Item,
    /// Probability of a correct answer at the current theta.
    pub probability: f64,
    /// Fisher information at the current theta.
    pub fisher_information: f64,
    /// Fisher information integrated over the current posterior.
    pub expected_fisher_information: f64,
    /// Criterion that picked the item.
    pub method: SelectionMethod,
    /// Unused items in the bank before this selection.
    pub available_items: usize,
}

/// Result of a selection query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Selection {
    Selected(ItemSelection),
    /// Every item has been used. Not a fault: the caller finalizes.
    Exhausted,
}

impl Selection {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Selection::Exhausted)
    }

    pub fn into_option(self) -> Option<ItemSelection> {
        match self {
            Selection::Selected(selection) => Some(selection),
            Selection::Exhausted => None,
        }
    }
}

/// Expected Fisher information of `item` under `posterior`.
pub fn expected_information(item: &ItemParams, posterior: &Posterior<'_>) -> f64 {
    posterior.expectation(|theta| item_information(theta, item))
}

/// Picks the most informative unused item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemSelector {
    method: SelectionMethod,
}

impl ItemSelector {
    pub fn new(method: SelectionMethod) -> Self {
        Self { method }
    }

    /// Select the next item.
    ///
    /// MI scores items by information at `theta`; EFI by information
    /// integrated over `posterior`. Ties go to the lowest item id.
    pub fn select(
        &self,
        bank: &ItemBank,
        used: &[String],
        theta: f64,
        posterior: &Posterior<'_>,
    ) -> Selection {
        let score = |item: &Item| match self.method {
            SelectionMethod::Mi => item_information(theta, &item.params),
            SelectionMethod::Efi => expected_information(&item.params, posterior),
        };

        // The bank iterates in id order, so keeping the first of equal scores
        // yields the lowest id.
        let mut available = 0usize;
        let mut best: Option<(&Item, f64)> = None;
        for item in bank.available(used) {
            available += 1;
            let s = score(item);
            match best {
                Some((_, best_score)) if s <= best_score + TIE_TOLERANCE => {}
                _ => best = Some((item, s)),
            }
        }

        let Some((item, best_score)) = best else {
            tracing::debug!(used = used.len(), "no items available for selection");
            return Selection::Exhausted;
        };

        tracing::debug!(
            item = %item.id,
            method = %self.method,
            score = best_score,
            theta,
            "selected item"
        );

        Selection::Selected(ItemSelection {
            item: item.clone(),
            probability: probability(theta, &item.params),
            fisher_information: item_information(theta, &item.params),
            expected_fisher_information: expected_information(&item.params, posterior),
            method: self.method,
            available_items: available,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Answer, ObservedResponse};
    use crate::posterior::ThetaGrid;

    fn bank() -> ItemBank {
        ItemBank::new(vec![
            Item::new("easy", ItemParams::new(1.5, -2.0, 0.2)),
            Item::new("mid", ItemParams::new(1.5, 0.0, 0.2)),
            Item::new("hard", ItemParams::new(1.5, 2.0, 0.2)),
            Item::new("flat", ItemParams::new(0.3, 0.0, 0.2)),
        ])
        .unwrap()
    }

    #[test]
    fn mi_prefers_item_near_theta() {
        let grid = ThetaGrid::default();
        let posterior = Posterior::prior(&grid);
        let selector = ItemSelector::new(SelectionMethod::Mi);

        let pick = |theta| {
            selector
                .select(&bank(), &[], theta, &posterior)
                .into_option()
                .unwrap()
                .item
                .id
        };
        assert_eq!(pick(0.0), "mid");
        assert_eq!(pick(2.3), "hard");
        assert_eq!(pick(-1.7), "easy");
    }

    #[test]
    fn efi_follows_the_posterior() {
        let grid = ThetaGrid::default();
        let history: Vec<_> = (0..6)
            .map(|_| ObservedResponse::new(ItemParams::new(1.5, 1.0, 0.0), Answer::Correct))
            .collect();
        let posterior = Posterior::compute(&grid, &history);
        let selector = ItemSelector::new(SelectionMethod::Efi);
        let selection = selector
            .select(&bank(), &[], posterior.map(), &posterior)
            .into_option()
            .unwrap();
        assert_eq!(selection.item.id, "hard");
        assert_eq!(selection.method, SelectionMethod::Efi);
        let expected = expected_information(&selection.item.params, &posterior);
        assert_eq!(selection.expected_fisher_information, expected);
    }

    #[test]
    fn never_returns_used_items() {
        let grid = ThetaGrid::default();
        let posterior = Posterior::prior(&grid);
        let bank = bank();
        for method in [SelectionMethod::Mi, SelectionMethod::Efi] {
            let selector = ItemSelector::new(method);
            let mut used: Vec<String> = Vec::new();
            while let Selection::Selected(sel) = selector.select(&bank, &used, 0.0, &posterior) {
                assert!(!used.contains(&sel.item.id));
                assert_eq!(sel.available_items, bank.len() - used.len());
                used.push(sel.item.id);
            }
            assert_eq!(used.len(), bank.len());
        }
    }

    #[test]
    fn exhausted_pool_is_signalled() {
        let grid = ThetaGrid::default();
        let posterior = Posterior::prior(&grid);
        let bank = bank();
        let used: Vec<String> = bank.items().iter().map(|i| i.id.clone()).collect();
        let selection = ItemSelector::default().select(&bank, &used, 0.0, &posterior);
        assert!(selection.is_exhausted());
        assert!(ItemSelector::default()
            .select(&ItemBank::default(), &[], 0.0, &posterior)
            .is_exhausted());
    }

    #[test]
    fn ties_break_to_lowest_id() {
        let grid = ThetaGrid::default();
        let posterior = Posterior::prior(&grid);
        let params = ItemParams::new(1.0, 0.0, 0.1);
        let bank = ItemBank::new(vec![
            Item::new("Q9", params),
            Item::new("Q2", params),
            Item::new("Q5", params),
        ])
        .unwrap();
        for method in [SelectionMethod::Mi, SelectionMethod::Efi] {
            let sel = ItemSelector::new(method)
                .select(&bank, &[], 0.0, &posterior)
                .into_option()
                .unwrap();
            assert_eq!(sel.item.id, "Q2");
        }
    }

    #[test]
    fn reports_probability_and_information_at_theta() {
        let grid = ThetaGrid::default();
        let posterior = Posterior::prior(&grid);
        let sel = ItemSelector::new(SelectionMethod::Mi)
            .select(&bank(), &[], 0.0, &posterior)
            .into_option()
            .unwrap();
        assert!((sel.probability - 0.6).abs() < 1e-12);
        assert_eq!(sel.fisher_information, item_information(0.0, &sel.item.params));
    }
}
