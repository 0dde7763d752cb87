//! Ledger and stock effects of documents.
//!
//! A document's posting is replaced, never edited: the active journal entry
//! and movements are reversed, the record is cleared, and the new plan is
//! posted and recorded. Entry and movement ids are derived from the record
//! and revision, so a retry after a partial failure skips what already landed.

use serde_json::Value as JsonValue;
use tracing::{debug, info};
use uuid::Uuid;

use ledgerdesk_accounting::{
    ChartCommand, ChartId, ChartOfAccounts, JournalCommand, JournalEntryLine, Ledger, LedgerId,
    PostJournalEntry, ReverseJournalEntry, SeedStandardChart, SourceDocument,
};
use ledgerdesk_core::DomainResult;
use ledgerdesk_events::{EventBus, EventEnvelope};
use ledgerdesk_inventory::{
    InventoryCommand, RecordMovement, ReverseMovement, StockItem, StockItemId, StockMovement,
};
use ledgerdesk_posting::{
    ActivePosting, ClearPosting, PostedMovement, PostingPlan, PostingRecord, PostingRecordCommand,
    PostingRecordId, RecordPosting,
};

use super::{CommandContext, Lifecycle, LifecycleError, LifecycleResult};
use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;

fn derived_id(record_id: PostingRecordId, revision: u32, part: &str) -> Uuid {
    Uuid::new_v5(record_id.0.as_uuid(), format!("{revision}/{part}").as_bytes())
}

fn reversal_id(original: Uuid) -> Uuid {
    Uuid::new_v5(&original, b"reversal")
}

impl<S, B> Lifecycle<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// The tenant's chart, seeded with the standard accounts on first use.
    pub fn ensure_chart(&self, ctx: &CommandContext) -> LifecycleResult<ChartOfAccounts> {
        let chart_id = ChartId::for_tenant(ctx.tenant_id);
        let chart = self.load::<ChartOfAccounts>(ctx.tenant_id, chart_id.0)?;
        if chart.is_created() {
            return Ok(chart);
        }

        let seeded = self.dispatch::<ChartOfAccounts>(
            ctx,
            chart_id.0,
            ChartCommand::SeedStandardChart(SeedStandardChart {
                tenant_id: ctx.tenant_id,
                chart_id,
                occurred_at: ctx.at,
            }),
        );
        match seeded {
            Ok(_) => info!(tenant_id = %ctx.tenant_id, "standard chart of accounts seeded"),
            // Seeded concurrently.
            Err(LifecycleError::Dispatch(
                DispatchError::Conflict(_) | DispatchError::Concurrency(_),
            )) => {}
            Err(err) => return Err(err),
        }
        self.load::<ChartOfAccounts>(ctx.tenant_id, chart_id.0)
    }

    /// Fail unless every warehouse can cover what `plan` takes out beyond
    /// what the document's active posting already took.
    pub(crate) fn ensure_stock(
        &self,
        ctx: &CommandContext,
        source: SourceDocument,
        plan: &PostingPlan,
    ) -> LifecycleResult<()> {
        let tenant_id = ctx.tenant_id;
        let record_id = PostingRecordId::for_source(tenant_id, source);
        let record = self.load::<PostingRecord>(tenant_id, record_id.0)?;

        let mut net = plan.stock_delta();
        if let Some(active) = record.active() {
            for m in &active.movements {
                *net.entry((m.product_id, m.warehouse_id)).or_insert(0) -= m.quantity;
            }
        }

        let mut short: Vec<_> = net.into_iter().filter(|(_, delta)| *delta < 0).collect();
        short.sort();
        for ((product_id, warehouse_id), delta) in short {
            let item_id = StockItemId::for_product(tenant_id, product_id, warehouse_id);
            let item = self.load::<StockItem>(tenant_id, item_id.0)?;
            item.check_availability(-delta)?;
        }
        Ok(())
    }

    /// Replace whatever `source` currently has posted with `plan`. `None` (or
    /// an empty plan) only reverses.
    #[tracing::instrument(skip(self, ctx, plan), fields(tenant_id = %ctx.tenant_id), err)]
    pub(crate) fn repost(
        &self,
        ctx: &CommandContext,
        source: SourceDocument,
        plan: Option<&PostingPlan>,
        reason: &str,
    ) -> LifecycleResult<usize> {
        let tenant_id = ctx.tenant_id;
        let record_id = PostingRecordId::for_source(tenant_id, source);
        let record = self.load::<PostingRecord>(tenant_id, record_id.0)?;
        let mut committed = 0;

        if let Some(active) = record.active() {
            committed += self.reverse_posting(ctx, active, reason)?;
            committed += self.dispatch::<PostingRecord>(
                ctx,
                record_id.0,
                PostingRecordCommand::ClearPosting(ClearPosting {
                    tenant_id,
                    record_id,
                    reason: reason.to_string(),
                    occurred_at: ctx.at,
                }),
            )?;
        }

        let Some(plan) = plan.filter(|p| !p.is_empty()) else {
            return Ok(committed);
        };
        let revision = record.revisions() + 1;

        let mut entry_id = None;
        if let Some(journal) = &plan.journal {
            let id = derived_id(record_id, revision, "journal");
            committed += self.post_entry(ctx, id, journal.source, &journal.description, |chart| {
                journal.resolve(chart)
            })?;
            entry_id = Some(id);
        }

        let mut movements = Vec::with_capacity(plan.movements.len());
        for (idx, m) in plan.movements.iter().enumerate() {
            let stock_item_id = StockItemId::for_product(tenant_id, m.product_id, m.warehouse_id);
            let movement_id = derived_id(record_id, revision, &format!("movement/{idx}"));
            let item = self.load::<StockItem>(tenant_id, stock_item_id.0)?;
            if !item.has_movement(movement_id) {
                committed += self.dispatch::<StockItem>(
                    ctx,
                    stock_item_id.0,
                    InventoryCommand::RecordMovement(RecordMovement {
                        tenant_id,
                        stock_item_id,
                        product_id: m.product_id,
                        warehouse_id: m.warehouse_id,
                        movement: StockMovement {
                            movement_id,
                            kind: m.kind,
                            quantity: m.quantity,
                            unit_cost: m.unit_cost,
                            source: Some(source),
                        },
                        allow_negative: false,
                        occurred_at: ctx.at,
                    }),
                )?;
            }
            movements.push(PostedMovement {
                stock_item_id,
                movement_id,
                product_id: m.product_id,
                warehouse_id: m.warehouse_id,
                quantity: m.quantity,
            });
        }

        committed += self.dispatch::<PostingRecord>(
            ctx,
            record_id.0,
            PostingRecordCommand::RecordPosting(RecordPosting {
                tenant_id,
                record_id,
                source,
                entry_id,
                movements,
                occurred_at: ctx.at,
            }),
        )?;
        debug!(revision, committed, "posting recorded");
        Ok(committed)
    }

    fn reverse_posting(
        &self,
        ctx: &CommandContext,
        active: &ActivePosting,
        reason: &str,
    ) -> LifecycleResult<usize> {
        let tenant_id = ctx.tenant_id;
        let mut committed = 0;

        if let Some(entry_id) = active.entry_id {
            let ledger_id = LedgerId::for_tenant(tenant_id);
            let ledger = self.load::<Ledger>(tenant_id, ledger_id.0)?;
            if ledger.entry(entry_id).is_some() && !ledger.is_reversed(entry_id) {
                committed += self.dispatch::<Ledger>(
                    ctx,
                    ledger_id.0,
                    JournalCommand::ReverseJournalEntry(ReverseJournalEntry {
                        tenant_id,
                        ledger_id,
                        entry_id,
                        reversal_entry_id: reversal_id(entry_id),
                        reason: Some(reason.to_string()),
                        occurred_at: ctx.at,
                    }),
                )?;
            }
        }

        for m in &active.movements {
            let item = self.load::<StockItem>(tenant_id, m.stock_item_id.0)?;
            if !item.has_movement(m.movement_id) || item.is_reversed(m.movement_id) {
                continue;
            }
            committed += self.dispatch::<StockItem>(
                ctx,
                m.stock_item_id.0,
                InventoryCommand::ReverseMovement(ReverseMovement {
                    tenant_id,
                    stock_item_id: m.stock_item_id,
                    movement_id: m.movement_id,
                    reversal_movement_id: reversal_id(m.movement_id),
                    allow_negative: true,
                    occurred_at: ctx.at,
                }),
            )?;
        }
        Ok(committed)
    }

    /// Post a plan's journal under a caller-chosen entry id (payments and
    /// credit applications). Posting the same id twice is a no-op.
    pub(crate) fn post_journal(
        &self,
        ctx: &CommandContext,
        entry_id: Uuid,
        plan: &PostingPlan,
    ) -> LifecycleResult<usize> {
        match &plan.journal {
            Some(journal) => {
                self.post_entry(ctx, entry_id, journal.source, &journal.description, |chart| {
                    journal.resolve(chart)
                })
            }
            None => Ok(0),
        }
    }

    fn post_entry(
        &self,
        ctx: &CommandContext,
        entry_id: Uuid,
        source: SourceDocument,
        description: &str,
        lines: impl FnOnce(&ChartOfAccounts) -> DomainResult<Vec<JournalEntryLine>>,
    ) -> LifecycleResult<usize> {
        let tenant_id = ctx.tenant_id;
        let ledger_id = LedgerId::for_tenant(tenant_id);
        let ledger = self.load::<Ledger>(tenant_id, ledger_id.0)?;
        if ledger.entry(entry_id).is_some() {
            return Ok(0);
        }
        let chart = self.ensure_chart(ctx)?;
        let lines = lines(&chart)?;
        self.dispatch::<Ledger>(
            ctx,
            ledger_id.0,
            JournalCommand::PostJournalEntry(PostJournalEntry {
                tenant_id,
                ledger_id,
                entry_id,
                lines,
                source: Some(source),
                description: Some(description.to_string()),
                occurred_at: ctx.at,
            }),
        )
    }
}

