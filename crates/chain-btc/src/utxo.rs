use rand::seq::index::sample;
use rand::Rng;
use tracing::{debug, trace};

use crate::error::BtcError;
use crate::transaction::{estimate_fee, FeeRate};

/// Outputs assumed for every selection: recipient plus change.
const SELECTION_OUTPUTS: usize = 2;

/// A single unspent transaction output (UTXO).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    /// Transaction ID as a hex string (big-endian / display order).
    pub txid: String,
    /// Output index within the transaction.
    pub vout: u32,
    /// Value in satoshis.
    pub amount_sat: u64,
    /// The locking script (scriptPubKey) serialized bytes.
    pub script_pubkey: Vec<u8>,
}

/// Result of UTXO selection: the chosen UTXOs and their aggregate value.
///
/// `total_sat >= target + fee` always holds, where `fee` is computed for
/// exactly `selected.len()` inputs and two outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionResult {
    /// The selected UTXOs.
    pub selected: Vec<Utxo>,
    /// Total value of the selected UTXOs in satoshis.
    pub total_sat: u64,
    /// Fee for this selection's input count and two outputs.
    pub fee: u64,
}

/// How far the selector may go after the deterministic passes fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Exact match, nearest single cover, then ascending greedy.
    #[default]
    Deterministic,
    /// As `Deterministic`, then up to `attempts` random subsets, keeping the
    /// smallest one that clears the threshold.
    RandomizedFallback { attempts: u32 },
}

/// Select UTXOs to cover `target_sat` plus the fee for the chosen input count.
///
/// Candidates are sorted ascending. A single UTXO worth exactly the target
/// plus the one-input fee wins outright; otherwise the smallest single UTXO
/// that covers it; otherwise UTXOs are accumulated smallest-first, with the
/// fee threshold re-evaluated after each addition. If the ascending pass
/// runs out, the largest UTXOs are tried together so that any coverable
/// target is found.
pub fn select_utxos(
    utxos: &[Utxo],
    target_sat: u64,
    fee_rate: FeeRate,
) -> Result<SelectionResult, BtcError> {
    select_utxos_with(
        utxos,
        target_sat,
        fee_rate,
        SelectionStrategy::Deterministic,
        &mut rand::thread_rng(),
    )
}

/// [`select_utxos`] with an explicit strategy and random source.
///
/// The RNG is only touched by [`SelectionStrategy::RandomizedFallback`].
pub fn select_utxos_with<R: Rng + ?Sized>(
    utxos: &[Utxo],
    target_sat: u64,
    fee_rate: FeeRate,
    strategy: SelectionStrategy,
    rng: &mut R,
) -> Result<SelectionResult, BtcError> {
    if target_sat == 0 {
        return Err(BtcError::TransactionBuild("target must be non-zero".into()));
    }

    let threshold = |inputs: usize| {
        target_sat.saturating_add(estimate_fee(inputs, SELECTION_OUTPUTS, fee_rate))
    };

    let mut sorted: Vec<&Utxo> = utxos.iter().collect();
    sorted.sort_by(|a, b| {
        a.amount_sat
            .cmp(&b.amount_sat)
            .then_with(|| a.txid.cmp(&b.txid))
            .then(a.vout.cmp(&b.vout))
    });

    let single = threshold(1);

    if let Some(exact) = sorted.iter().find(|u| u.amount_sat == single) {
        trace!(txid = %exact.txid, vout = exact.vout, "exact single-input match");
        return Ok(finish(vec![*exact], fee_rate));
    }

    if let Some(nearest) = sorted.iter().find(|u| u.amount_sat > single) {
        trace!(txid = %nearest.txid, vout = nearest.vout, "nearest single-input cover");
        return Ok(finish(vec![*nearest], fee_rate));
    }

    let mut running: u64 = 0;
    for (i, utxo) in sorted.iter().enumerate() {
        running = running.saturating_add(utxo.amount_sat);
        if running >= threshold(i + 1) {
            debug!(inputs = i + 1, total_sat = running, "greedy cover");
            return Ok(finish(sorted[..=i].to_vec(), fee_rate));
        }
    }

    if let SelectionStrategy::RandomizedFallback { attempts } = strategy {
        if let Some(found) = random_search(&sorted, attempts, &threshold, rng) {
            debug!(inputs = found.len(), "randomized subset cover");
            return Ok(finish(found, fee_rate));
        }
    }

    // For a fixed input count k, the k largest UTXOs have the largest sum,
    // so if they do not cover threshold(k) no k-subset does.
    let mut running: u64 = 0;
    for (k, utxo) in sorted.iter().rev().enumerate() {
        running = running.saturating_add(utxo.amount_sat);
        if running >= threshold(k + 1) {
            let start = sorted.len() - (k + 1);
            debug!(inputs = k + 1, total_sat = running, "largest-first cover");
            return Ok(finish(sorted[start..].to_vec(), fee_rate));
        }
    }

    let available = sorted
        .iter()
        .fold(0u64, |acc, u| acc.saturating_add(u.amount_sat));
    Err(BtcError::InsufficientFunds {
        needed: threshold(sorted.len().max(1)),
        available,
    })
}

fn random_search<'a, R: Rng + ?Sized>(
    sorted: &[&'a Utxo],
    attempts: u32,
    threshold: &dyn Fn(usize) -> u64,
    rng: &mut R,
) -> Option<Vec<&'a Utxo>> {
    if sorted.is_empty() {
        return None;
    }

    let mut best: Option<Vec<&Utxo>> = None;
    for _ in 0..attempts {
        let limit = best.as_ref().map_or(sorted.len(), |b| b.len() - 1);
        if limit == 0 {
            break;
        }
        let size = rng.gen_range(1..=limit);
        let picked: Vec<&Utxo> = sample(rng, sorted.len(), size)
            .into_iter()
            .map(|i| sorted[i])
            .collect();
        let sum = picked
            .iter()
            .fold(0u64, |acc, u| acc.saturating_add(u.amount_sat));
        if sum >= threshold(picked.len()) {
            best = Some(picked);
        }
    }
    best
}

fn finish(picked: Vec<&Utxo>, fee_rate: FeeRate) -> SelectionResult {
    let total_sat = picked
        .iter()
        .fold(0u64, |acc, u| acc.saturating_add(u.amount_sat));
    let fee = estimate_fee(picked.len(), SELECTION_OUTPUTS, fee_rate);
    SelectionResult {
        selected: picked.into_iter().cloned().collect(),
        total_sat,
        fee,
    }
}
