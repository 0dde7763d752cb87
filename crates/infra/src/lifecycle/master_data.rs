//! Products, parties, the company profile, the chart of accounts and manual
//! stock adjustments.

use serde_json::Value as JsonValue;
use uuid::Uuid;

use ledgerdesk_accounting::{
    Account, AddAccount, ChartCommand, ChartId, ChartOfAccounts, DeactivateAccount, DocumentKind,
    PostingRole, SourceDocument,
};
use ledgerdesk_core::{AggregateId, DomainError};
use ledgerdesk_events::{EventBus, EventEnvelope};
use ledgerdesk_inventory::{
    InventoryCommand, MovementKind, RecordMovement, StockItem, StockItemId, StockMovement,
    WarehouseId,
};
use ledgerdesk_parties::{
    Company, CompanyCommand, CompanyId, CompanyProfile, ContactInfo, Party, PartyCommand, PartyId,
    PartyKind, ReactivateParty, RegisterParty, SaveCompanyProfile, SuspendParty, UpdateDetails,
};
use ledgerdesk_posting::{JournalDraft, PostingPlan};
use ledgerdesk_products::{
    ActivateProduct, ArchiveProduct, CreateProduct, Product, ProductCommand, ProductId,
    ProductPricing, UpdateProductPricing,
};

use super::error::AfterCommit;
use super::inputs::{NewProduct, StockAdjustment};
use super::{CommandContext, Lifecycle, LifecycleResult, Outcome};
use crate::event_store::EventStore;

impl<S, B> Lifecycle<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    #[tracing::instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, sku = %input.sku), err)]
    pub fn create_product(&self, ctx: &CommandContext, input: NewProduct) -> LifecycleResult<Outcome> {
        let product_id = input.product_id.unwrap_or_else(|| ProductId(AggregateId::new()));
        let mut committed = self.dispatch::<Product>(
            ctx,
            product_id.0,
            ProductCommand::CreateProduct(CreateProduct {
                tenant_id: ctx.tenant_id,
                product_id,
                sku: input.sku,
                name: input.name,
                pricing: input.pricing,
                track_inventory: input.track_inventory,
                occurred_at: ctx.at,
            }),
        )?;
        if input.activate {
            committed += self.dispatch::<Product>(
                ctx,
                product_id.0,
                ProductCommand::ActivateProduct(ActivateProduct {
                    tenant_id: ctx.tenant_id,
                    product_id,
                    occurred_at: ctx.at,
                }),
            )?;
        }
        let product = self.load::<Product>(ctx.tenant_id, product_id.0)?;
        Ok(Outcome {
            committed,
            ..Outcome::new(product_id.0).with_status(product.status())
        })
    }

    pub fn update_product_pricing(
        &self,
        ctx: &CommandContext,
        product_id: ProductId,
        pricing: ProductPricing,
    ) -> LifecycleResult<Outcome> {
        self.product_command(
            ctx,
            product_id,
            ProductCommand::UpdateProductPricing(UpdateProductPricing {
                tenant_id: ctx.tenant_id,
                product_id,
                pricing,
                occurred_at: ctx.at,
            }),
        )
    }

    pub fn activate_product(&self, ctx: &CommandContext, product_id: ProductId) -> LifecycleResult<Outcome> {
        self.product_command(
            ctx,
            product_id,
            ProductCommand::ActivateProduct(ActivateProduct {
                tenant_id: ctx.tenant_id,
                product_id,
                occurred_at: ctx.at,
            }),
        )
    }

    /// Archived products stay on existing documents but cannot be added to
    /// new lines.
    pub fn archive_product(&self, ctx: &CommandContext, product_id: ProductId) -> LifecycleResult<Outcome> {
        self.product_command(
            ctx,
            product_id,
            ProductCommand::ArchiveProduct(ArchiveProduct {
                tenant_id: ctx.tenant_id,
                product_id,
                occurred_at: ctx.at,
            }),
        )
    }

    fn product_command(
        &self,
        ctx: &CommandContext,
        product_id: ProductId,
        command: ProductCommand,
    ) -> LifecycleResult<Outcome> {
        let (product, committed) = self.dispatch_loaded::<Product>(ctx, product_id.0, command)?;
        Ok(Outcome {
            committed,
            ..Outcome::new(product_id.0).with_status(product.status())
        })
    }

    #[tracing::instrument(skip(self, ctx, contact), fields(tenant_id = %ctx.tenant_id), err)]
    pub fn register_party(
        &self,
        ctx: &CommandContext,
        party_id: Option<PartyId>,
        kind: PartyKind,
        name: String,
        contact: Option<ContactInfo>,
    ) -> LifecycleResult<Outcome> {
        let party_id = party_id.unwrap_or_else(|| PartyId(AggregateId::new()));
        self.party_command(
            ctx,
            party_id,
            PartyCommand::RegisterParty(RegisterParty {
                tenant_id: ctx.tenant_id,
                party_id,
                kind,
                name,
                contact,
                occurred_at: ctx.at,
            }),
        )
    }

    pub fn update_party(
        &self,
        ctx: &CommandContext,
        party_id: PartyId,
        name: Option<String>,
        contact: Option<ContactInfo>,
    ) -> LifecycleResult<Outcome> {
        self.party_command(
            ctx,
            party_id,
            PartyCommand::UpdateDetails(UpdateDetails {
                tenant_id: ctx.tenant_id,
                party_id,
                name,
                contact,
                occurred_at: ctx.at,
            }),
        )
    }

    pub fn suspend_party(
        &self,
        ctx: &CommandContext,
        party_id: PartyId,
        reason: Option<String>,
    ) -> LifecycleResult<Outcome> {
        self.party_command(
            ctx,
            party_id,
            PartyCommand::SuspendParty(SuspendParty {
                tenant_id: ctx.tenant_id,
                party_id,
                reason,
                occurred_at: ctx.at,
            }),
        )
    }

    pub fn reactivate_party(&self, ctx: &CommandContext, party_id: PartyId) -> LifecycleResult<Outcome> {
        self.party_command(
            ctx,
            party_id,
            PartyCommand::ReactivateParty(ReactivateParty {
                tenant_id: ctx.tenant_id,
                party_id,
                occurred_at: ctx.at,
            }),
        )
    }

    fn party_command(
        &self,
        ctx: &CommandContext,
        party_id: PartyId,
        command: PartyCommand,
    ) -> LifecycleResult<Outcome> {
        let (party, committed) = self.dispatch_loaded::<Party>(ctx, party_id.0, command)?;
        Ok(Outcome {
            committed,
            ..Outcome::new(party_id.0).with_status(party.status())
        })
    }

    /// Create or replace the tenant's company profile.
    pub fn save_company_profile(
        &self,
        ctx: &CommandContext,
        profile: CompanyProfile,
    ) -> LifecycleResult<Outcome> {
        let company_id = CompanyId::for_tenant(ctx.tenant_id);
        let (_, committed) = self.dispatch_loaded::<Company>(
            ctx,
            company_id.0,
            CompanyCommand::SaveCompanyProfile(SaveCompanyProfile {
                tenant_id: ctx.tenant_id,
                company_id,
                profile,
                occurred_at: ctx.at,
            }),
        )?;
        Ok(Outcome {
            committed,
            ..Outcome::new(company_id.0).with_status("saved")
        })
    }

    pub fn add_account(&self, ctx: &CommandContext, account: Account) -> LifecycleResult<Outcome> {
        self.ensure_chart(ctx)?;
        let chart_id = ChartId::for_tenant(ctx.tenant_id);
        let committed = self.dispatch::<ChartOfAccounts>(
            ctx,
            chart_id.0,
            ChartCommand::AddAccount(AddAccount {
                tenant_id: ctx.tenant_id,
                chart_id,
                account,
                occurred_at: ctx.at,
            }),
        )?;
        Ok(Outcome {
            committed,
            ..Outcome::new(chart_id.0).with_status("active")
        })
    }

    pub fn deactivate_account(&self, ctx: &CommandContext, code: String) -> LifecycleResult<Outcome> {
        self.ensure_chart(ctx)?;
        let chart_id = ChartId::for_tenant(ctx.tenant_id);
        let committed = self.dispatch::<ChartOfAccounts>(
            ctx,
            chart_id.0,
            ChartCommand::DeactivateAccount(DeactivateAccount {
                tenant_id: ctx.tenant_id,
                chart_id,
                code,
                occurred_at: ctx.at,
            }),
        )?;
        Ok(Outcome {
            committed,
            ..Outcome::new(chart_id.0).with_status("inactive")
        })
    }

    /// Record a manual stock correction and post its value against the
    /// adjustments account.
    #[tracing::instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, product_id = %input.product_id), err)]
    pub fn adjust_stock(&self, ctx: &CommandContext, input: StockAdjustment) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        let product = self.load_existing::<Product>(tenant_id, input.product_id.0, "product")?;
        if !product.tracks_inventory() {
            return Err(DomainError::validation(format!(
                "product {} does not track inventory",
                product.sku()
            ))
            .into());
        }
        let warehouse_id = input.warehouse_id.unwrap_or_else(|| WarehouseId::main(tenant_id));
        let stock_item_id = StockItemId::for_product(tenant_id, input.product_id, warehouse_id);
        let movement_id = input.movement_id.unwrap_or_else(Uuid::now_v7);
        let unit_cost = input.unit_cost.unwrap_or(product.pricing().standard_cost);
        let source = SourceDocument::new(DocumentKind::Manual, AggregateId::from_uuid(movement_id));

        let (item, committed) = self.dispatch_loaded::<StockItem>(
            ctx,
            stock_item_id.0,
            InventoryCommand::RecordMovement(RecordMovement {
                tenant_id,
                stock_item_id,
                product_id: input.product_id,
                warehouse_id,
                movement: StockMovement {
                    movement_id,
                    kind: MovementKind::Adjustment,
                    quantity: input.quantity,
                    unit_cost,
                    source: Some(source),
                },
                allow_negative: false,
                occurred_at: ctx.at,
            }),
        )?;

        let value = input
            .quantity
            .checked_mul(unit_cost)
            .ok_or_else(|| DomainError::overflow("stock adjustment value"))?;
        let mut journal = JournalDraft::new(source, "stock adjustment");
        journal
            .debit(PostingRole::Inventory, value)
            .credit(PostingRole::Adjustments, value);
        let plan = PostingPlan {
            journal: (!journal.lines.is_empty()).then_some(journal),
            movements: Vec::new(),
        };
        let posted = self
            .post_journal(ctx, movement_id, &plan)
            .after_commit(stock_item_id.0, "adjustment posting")?;

        Ok(Outcome {
            committed: committed + posted,
            ..Outcome::new(stock_item_id.0).with_status(item.on_hand())
        })
    }
}
