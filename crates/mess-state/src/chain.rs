//! # Extension Chains
//!
//! Extensions form a singly-linked list through `previousTransactionId`.
//! A well-formed chain:
//!
//! - terminates at a root (a record with no predecessor);
//! - never revisits a record;
//! - has non-decreasing dates from root to tip;
//! - gives every predecessor at most one successor.
//!
//! [`walk`] checks the first three from a single record. [`audit`] checks a
//! full record set, including the successor rule.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use thiserror::Error;

use mess_core::{MessError, TransactionId};

use crate::transaction::Transaction;

/// A broken extension chain.
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChainError {
    /// Following predecessor links returned to an already-visited record.
    #[error("extension chain cycles at {at}")]
    Cycle { at: TransactionId },

    /// A predecessor link points at a record that does not exist.
    #[error("transaction {transaction} links to missing predecessor {missing}")]
    MissingLink {
        transaction: TransactionId,
        missing: TransactionId,
    },

    /// A successor starts or ends before its predecessor.
    #[error("transaction {transaction} ({start}..{end}) regresses before predecessor {predecessor}")]
    DateRegression {
        transaction: TransactionId,
        predecessor: TransactionId,
        start: NaiveDate,
        end: NaiveDate,
    },

    /// A predecessor has more than one successor.
    #[error("transaction {predecessor} has {count} successors")]
    Fork {
        predecessor: TransactionId,
        count: usize,
    },

    /// `isExtension` disagrees with the presence of a predecessor link.
    #[error("transaction {transaction} has an inconsistent extension flag")]
    InconsistentFlag { transaction: TransactionId },
}

impl From<ChainError> for MessError {
    fn from(err: ChainError) -> Self {
        MessError::InvalidState(err.to_string())
    }
}

/// Walk from `start` back to the root of its chain.
///
/// Returns the records tip-first: `start` itself, its predecessor, and so
/// on down to the root.
pub fn walk<'a, F>(start: &'a Transaction, lookup: F) -> Result<Vec<&'a Transaction>, ChainError>
where
    F: Fn(&TransactionId) -> Option<&'a Transaction>,
{
    let mut seen = HashSet::new();
    let mut chain = vec![start];
    let mut current = start;
    seen.insert(current.transaction_id);

    loop {
        check_flag(current)?;
        let Some(prev_id) = current.previous_transaction_id else {
            return Ok(chain);
        };
        if !seen.insert(prev_id) {
            return Err(ChainError::Cycle { at: prev_id });
        }
        let prev = lookup(&prev_id).ok_or(ChainError::MissingLink {
            transaction: current.transaction_id,
            missing: prev_id,
        })?;
        check_dates(current, prev)?;
        chain.push(prev);
        current = prev;
    }
}

/// Check every chain in `records`. Returns all problems found.
pub fn audit(records: &[Transaction]) -> Vec<ChainError> {
    let by_id: HashMap<TransactionId, &Transaction> =
        records.iter().map(|t| (t.transaction_id, t)).collect();
    let mut errors = Vec::new();

    let mut successors: HashMap<TransactionId, usize> = HashMap::new();
    for tx in records {
        if let Some(prev) = tx.previous_transaction_id {
            *successors.entry(prev).or_default() += 1;
        }
    }
    let mut forks: Vec<_> = successors.into_iter().filter(|(_, n)| *n > 1).collect();
    forks.sort_by_key(|(id, _)| *id);
    errors.extend(
        forks
            .into_iter()
            .map(|(predecessor, count)| ChainError::Fork { predecessor, count }),
    );

    // Only walk from tips; every interior record is covered by some tip.
    let linked: HashSet<TransactionId> = records
        .iter()
        .filter_map(|t| t.previous_transaction_id)
        .collect();
    let mut reported = HashSet::new();
    let mut covered = HashSet::new();
    for tip in records.iter().filter(|t| !linked.contains(&t.transaction_id)) {
        match walk(tip, |id| by_id.get(id).copied()) {
            Ok(chain) => covered.extend(chain.iter().map(|t| t.transaction_id)),
            Err(err) => {
                if reported.insert(err.clone()) {
                    errors.push(err);
                }
            }
        }
    }

    // Pure cycles have no tip; catch them from any unvisited member.
    for tx in records {
        if covered.contains(&tx.transaction_id) || !linked.contains(&tx.transaction_id) {
            continue;
        }
        if let Err(err @ ChainError::Cycle { .. }) = walk(tx, |id| by_id.get(id).copied()) {
            let members = cycle_members(tx, &by_id);
            if members.iter().all(|m| !covered.contains(m)) {
                covered.extend(members);
                if reported.insert(err.clone()) {
                    errors.push(err);
                }
            }
        }
    }

    errors
}

fn cycle_members<'a>(
    start: &'a Transaction,
    by_id: &HashMap<TransactionId, &'a Transaction>,
) -> Vec<TransactionId> {
    let mut members = vec![start.transaction_id];
    let mut current = start;
    while let Some(prev) = current
        .previous_transaction_id
        .and_then(|id| by_id.get(&id).copied())
    {
        if members.contains(&prev.transaction_id) {
            break;
        }
        members.push(prev.transaction_id);
        current = prev;
    }
    members
}

fn check_flag(tx: &Transaction) -> Result<(), ChainError> {
    if tx.is_extension != tx.previous_transaction_id.is_some() {
        return Err(ChainError::InconsistentFlag {
            transaction: tx.transaction_id,
        });
    }
    Ok(())
}

fn check_dates(successor: &Transaction, predecessor: &Transaction) -> Result<(), ChainError> {
    if successor.start_date < predecessor.start_date || successor.end_date < predecessor.end_date {
        return Err(ChainError::DateRegression {
            transaction: successor.transaction_id,
            predecessor: predecessor.transaction_id,
            start: successor.start_date,
            end: successor.end_date,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{PaymentStatus, PlanTerms};
    use chrono::{TimeZone, Utc};
    use mess_core::{MealsIncluded, Money, NumericId, PlanType, RedemptionToken};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn tx(start: u32, end: u32, previous: Option<TransactionId>) -> Transaction {
        Transaction::open(
            TransactionId::new(),
            PlanTerms {
                student_id: NumericId::new(101).unwrap(),
                plan_type: PlanType::Weekly,
                meals_included: MealsIncluded::default(),
                start_date: date(start),
                end_date: date(end),
                amount: Money::ZERO,
                payment_method: "cash".into(),
                payment_status: PaymentStatus::Completed,
            },
            RedemptionToken::new(format!("tok-{start}-{end}")).unwrap(),
            previous,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn lookup<'a>(
        records: &'a [Transaction],
    ) -> impl Fn(&TransactionId) -> Option<&'a Transaction> + 'a {
        move |id| records.iter().find(|t| t.transaction_id == *id)
    }

    #[test]
    fn walks_tip_to_root() {
        let root = tx(1, 7, None);
        let mid = tx(7, 14, Some(root.transaction_id));
        let tip = tx(14, 21, Some(mid.transaction_id));
        let records = vec![root.clone(), mid.clone(), tip.clone()];

        let chain = walk(&records[2], lookup(&records)).unwrap();
        let ids: Vec<_> = chain.iter().map(|t| t.transaction_id).collect();
        assert_eq!(ids, vec![tip.transaction_id, mid.transaction_id, root.transaction_id]);
        assert!(audit(&records).is_empty());
    }

    #[test]
    fn root_alone_is_a_chain() {
        let root = tx(1, 7, None);
        let records = vec![root];
        assert_eq!(walk(&records[0], lookup(&records)).unwrap().len(), 1);
    }

    #[test]
    fn detects_missing_predecessor() {
        let orphan = tx(7, 14, Some(TransactionId::new()));
        let records = vec![orphan];
        assert!(matches!(
            walk(&records[0], lookup(&records)),
            Err(ChainError::MissingLink { .. })
        ));
    }

    #[test]
    fn detects_date_regression() {
        let root = tx(10, 20, None);
        let bad = tx(5, 12, Some(root.transaction_id));
        let records = vec![root, bad];
        let errors = audit(&records);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ChainError::DateRegression { .. }));
    }

    #[test]
    fn detects_cycle() {
        let mut a = tx(1, 7, None);
        let mut b = tx(7, 14, Some(a.transaction_id));
        a.previous_transaction_id = Some(b.transaction_id);
        a.is_extension = true;
        // Keep dates monotone in both directions so the cycle is what trips.
        a.start_date = date(7);
        a.end_date = date(14);
        b.start_date = date(7);
        let records = vec![a, b];

        assert!(matches!(
            walk(&records[0], lookup(&records)),
            Err(ChainError::Cycle { .. })
        ));
        let errors = audit(&records);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ChainError::Cycle { .. }));
    }

    #[test]
    fn detects_fork() {
        let root = tx(1, 7, None);
        let first = tx(7, 14, Some(root.transaction_id));
        let second = tx(7, 14, Some(root.transaction_id));
        let records = vec![root.clone(), first, second];
        let errors = audit(&records);
        assert_eq!(
            errors,
            vec![ChainError::Fork {
                predecessor: root.transaction_id,
                count: 2
            }]
        );
    }

    #[test]
    fn detects_inconsistent_flag() {
        let mut root = tx(1, 7, None);
        root.is_extension = true;
        let records = vec![root];
        assert!(matches!(
            walk(&records[0], lookup(&records)),
            Err(ChainError::InconsistentFlag { .. })
        ));
    }
}
