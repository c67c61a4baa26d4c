//! Idempotent application of decoded contract events to invoice state.
//!
//! Every write is conditional, so replaying an event (the watcher delivers at least
//! once) leaves the record as the first application did.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::ethereum::contract::{ContractEvent, InvoiceCreated, InvoicePaid};
use crate::ethereum::hash_key;
use crate::invoice::InvoiceStatus;
use crate::invoice::store::SqliteInvoiceStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Linked,
    AlreadyLinked,
    Paid { previous: InvoiceStatus },
    AlreadyPaid,
    /// no local invoice correlates with the event
    Unmatched,
    /// the on-chain id is already linked to another invoice
    Conflicting,
}

impl Reconciliation {
    pub fn changed_state(self) -> bool {
        matches!(self, Self::Linked | Self::Paid { .. })
    }
}

pub fn apply_event(
    store: &mut SqliteInvoiceStore,
    event: &ContractEvent,
    now: DateTime<Utc>,
) -> Result<Reconciliation> {
    match event {
        ContractEvent::InvoiceCreated(created) => handle_invoice_created(store, created, now),
        ContractEvent::InvoicePaid(paid) => handle_invoice_paid(store, paid, now),
    }
}

fn handle_invoice_created(
    store: &mut SqliteInvoiceStore,
    event: &InvoiceCreated,
    now: DateTime<Utc>,
) -> Result<Reconciliation> {
    let tx_hash = hash_key(&event.tx_hash);
    let onchain_id = event.invoice_id;

    let Some(invoice) = store.find_by_tx_hash(&tx_hash)? else {
        tracing::warn!(
            %tx_hash,
            onchain_invoice_id = %onchain_id,
            "InvoiceCreated for unknown transaction, dropping"
        );
        return Ok(Reconciliation::Unmatched);
    };

    if let Some(existing) = invoice.onchain_invoice_id {
        if existing != onchain_id {
            tracing::warn!(
                invoice_id = %invoice.id,
                linked = %existing,
                observed = %onchain_id,
                "invoice already linked to a different onchain id"
            );
        }
        return Ok(Reconciliation::AlreadyLinked);
    }

    if let Some(other) = store.find_by_onchain_id(onchain_id)? {
        tracing::warn!(
            invoice_id = %invoice.id,
            other_invoice_id = %other.id,
            onchain_invoice_id = %onchain_id,
            "onchain id already linked to another invoice, dropping"
        );
        return Ok(Reconciliation::Conflicting);
    }

    if invoice.amount_wei != event.amount_wei {
        tracing::warn!(
            invoice_id = %invoice.id,
            stored_wei = %invoice.amount_wei,
            onchain_wei = %event.amount_wei,
            "InvoiceCreated amount differs from stored amount"
        );
    }

    if !store.link_onchain_id(&invoice.id, onchain_id, now)? {
        return Ok(Reconciliation::AlreadyLinked);
    }

    tracing::info!(
        invoice_id = %invoice.id,
        onchain_invoice_id = %onchain_id,
        %tx_hash,
        "invoice linked to onchain id"
    );
    Ok(Reconciliation::Linked)
}

fn handle_invoice_paid(
    store: &mut SqliteInvoiceStore,
    event: &InvoicePaid,
    now: DateTime<Utc>,
) -> Result<Reconciliation> {
    let onchain_id = event.invoice_id;
    let tx_hash = hash_key(&event.tx_hash);

    let Some(invoice) = store.find_by_onchain_id(onchain_id)? else {
        tracing::warn!(
            onchain_invoice_id = %onchain_id,
            %tx_hash,
            "InvoicePaid for unknown onchain id, dropping"
        );
        return Ok(Reconciliation::Unmatched);
    };

    if invoice.status == InvoiceStatus::Paid {
        tracing::debug!(invoice_id = %invoice.id, "invoice already paid");
        return Ok(Reconciliation::AlreadyPaid);
    }

    if invoice.amount_wei != event.amount_wei {
        tracing::warn!(
            invoice_id = %invoice.id,
            stored_wei = %invoice.amount_wei,
            paid_wei = %event.amount_wei,
            "InvoicePaid amount differs from stored amount"
        );
    }

    let payer = event.payer.to_checksum(None);
    if !store.mark_paid(&invoice.id, &payer, &tx_hash, now)? {
        return Ok(Reconciliation::AlreadyPaid);
    }

    if invoice.status == InvoiceStatus::Expired {
        tracing::info!(
            invoice_id = %invoice.id,
            "payment observed after expiry, invoice moved from EXPIRED to PAID"
        );
    }
    tracing::info!(
        invoice_id = %invoice.id,
        onchain_invoice_id = %onchain_id,
        payer = %payer,
        %tx_hash,
        "invoice marked paid"
    );
    Ok(Reconciliation::Paid {
        previous: invoice.status,
    })
}
