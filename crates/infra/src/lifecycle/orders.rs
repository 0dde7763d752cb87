//! Sales and purchase orders. Orders never post; they feed invoices and bills.

use serde_json::Value as JsonValue;

use ledgerdesk_core::{AggregateId, DomainError};
use ledgerdesk_events::{EventBus, EventEnvelope};
use ledgerdesk_inventory::WarehouseId;
use ledgerdesk_invoicing::{CreateInvoice, Invoice, InvoiceId};
use ledgerdesk_parties::{PartyId, PartyKind};
use ledgerdesk_pricing::PricingSettings;
use ledgerdesk_purchasing::{
    ApprovePurchaseOrder, CancelPurchaseOrder, ClosePurchaseOrder, CreatePurchaseOrder,
    PurchaseOrder, PurchaseOrderCommand, PurchaseOrderId,
};
use ledgerdesk_sales::{
    CancelSalesOrder, CloseSalesOrder, ConfirmSalesOrder, CreateSalesOrder, LinkInvoice,
    MirrorInvoice, ReplaceSalesOrderLines, SalesOrder, SalesOrderCommand, SalesOrderId,
    SalesOrderStatus, UnlinkInvoice,
};

use super::catalog::PriceBasis;
use super::inputs::{ConvertOrderInput, LineInput, NewPurchaseOrder, NewSalesOrder};
use super::{CommandContext, Lifecycle, LifecycleResult, Outcome, required};
use crate::event_store::EventStore;

impl<S, B> Lifecycle<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    #[tracing::instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, number = %input.number), err)]
    pub fn create_sales_order(&self, ctx: &CommandContext, input: NewSalesOrder) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        self.party_as(tenant_id, input.customer_id, PartyKind::Customer)?;
        let lines = self.resolve_lines(tenant_id, &input.lines, PriceBasis::Sale)?;
        let settings = match input.settings {
            Some(s) => s,
            None => self.default_settings(tenant_id)?,
        };
        let order_id = input.order_id.unwrap_or_else(|| SalesOrderId(AggregateId::new()));

        let mut committed = self.dispatch::<SalesOrder>(
            ctx,
            order_id.0,
            SalesOrderCommand::CreateSalesOrder(CreateSalesOrder {
                tenant_id,
                order_id,
                number: input.number,
                customer_id: input.customer_id,
                order_date: input.order_date,
                lines,
                settings,
                occurred_at: ctx.at,
            }),
        )?;
        if input.confirm {
            committed += self.dispatch::<SalesOrder>(ctx, order_id.0, confirm_order(ctx, order_id))?;
        }
        let order = self.load::<SalesOrder>(tenant_id, order_id.0)?;
        Ok(Outcome {
            committed,
            ..Outcome::new(order_id.0).with_status(order.status())
        })
    }

    pub fn replace_sales_order_lines(
        &self,
        ctx: &CommandContext,
        order_id: SalesOrderId,
        lines: Vec<LineInput>,
        settings: Option<PricingSettings>,
    ) -> LifecycleResult<Outcome> {
        let order = self.load_existing::<SalesOrder>(ctx.tenant_id, order_id.0, "sales order")?;
        let lines = self.resolve_lines(ctx.tenant_id, &lines, PriceBasis::Sale)?;
        let settings = settings.unwrap_or_else(|| order.settings().clone());
        self.sales_order_command(
            ctx,
            order_id,
            SalesOrderCommand::ReplaceSalesOrderLines(ReplaceSalesOrderLines {
                tenant_id: ctx.tenant_id,
                order_id,
                lines,
                settings,
                occurred_at: ctx.at,
            }),
        )
    }

    pub fn confirm_sales_order(&self, ctx: &CommandContext, order_id: SalesOrderId) -> LifecycleResult<Outcome> {
        self.sales_order_command(ctx, order_id, confirm_order(ctx, order_id))
    }

    pub fn cancel_sales_order(
        &self,
        ctx: &CommandContext,
        order_id: SalesOrderId,
        reason: Option<String>,
    ) -> LifecycleResult<Outcome> {
        self.sales_order_command(
            ctx,
            order_id,
            SalesOrderCommand::CancelSalesOrder(CancelSalesOrder {
                tenant_id: ctx.tenant_id,
                order_id,
                reason,
                occurred_at: ctx.at,
            }),
        )
    }

    fn sales_order_command(
        &self,
        ctx: &CommandContext,
        order_id: SalesOrderId,
        command: SalesOrderCommand,
    ) -> LifecycleResult<Outcome> {
        let (order, committed) = self.dispatch_loaded::<SalesOrder>(ctx, order_id.0, command)?;
        Ok(Outcome {
            committed,
            ..Outcome::new(order_id.0).with_status(order.status())
        })
    }

    /// Raise an invoice carrying the order's lines and pricing. The order is
    /// confirmed first if it is still a draft, then linked to the invoice.
    #[tracing::instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, order_id = %order_id), err)]
    pub fn convert_sales_order_to_invoice(
        &self,
        ctx: &CommandContext,
        order_id: SalesOrderId,
        input: ConvertOrderInput,
    ) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        let order = self.load_existing::<SalesOrder>(tenant_id, order_id.0, "sales order")?;
        let customer_id = required(order.customer_id(), "customer")?;
        self.ensure_order_convertible(&order, customer_id)?;
        self.party_as(tenant_id, customer_id, PartyKind::Customer)?;

        let create = CreateInvoice {
            tenant_id,
            invoice_id: input.invoice_id.unwrap_or_else(|| InvoiceId(AggregateId::new())),
            number: input.number,
            customer_id,
            sales_order_id: Some(order_id),
            warehouse_id: input.warehouse_id.unwrap_or_else(|| WarehouseId::main(tenant_id)),
            issue_date: input.issue_date,
            due_date: input.due_date,
            lines: order.lines().to_vec(),
            settings: order.settings().clone(),
            occurred_at: ctx.at,
        };
        self.create_invoice_from(ctx, create, input.issue)
    }

    /// Whether an invoice for `customer_id` may be raised against `order`.
    pub(crate) fn ensure_order_convertible(
        &self,
        order: &SalesOrder,
        customer_id: PartyId,
    ) -> LifecycleResult<()> {
        if order.customer_id() != Some(customer_id) {
            return Err(DomainError::validation("invoice customer differs from the sales order").into());
        }
        if order.invoice_id().is_some() {
            return Err(DomainError::conflict("sales order is already invoiced").into());
        }
        match order.status() {
            SalesOrderStatus::Draft | SalesOrderStatus::Confirmed => Ok(()),
            other => Err(DomainError::invariant(format!(
                "sales order is {} and cannot be invoiced",
                super::status_str(&other)
            ))
            .into()),
        }
    }

    /// Confirm (if needed), link and mirror the order behind `invoice`.
    pub(crate) fn link_sales_order(
        &self,
        ctx: &CommandContext,
        order_id: SalesOrderId,
        invoice: &Invoice,
    ) -> LifecycleResult<usize> {
        let order = self.load_existing::<SalesOrder>(ctx.tenant_id, order_id.0, "sales order")?;
        let invoice_id = invoice.id_typed().0;
        let mut committed = 0;
        if order.status() == SalesOrderStatus::Draft {
            committed += self.dispatch::<SalesOrder>(ctx, order_id.0, confirm_order(ctx, order_id))?;
        }
        committed += self.dispatch::<SalesOrder>(
            ctx,
            order_id.0,
            SalesOrderCommand::LinkInvoice(LinkInvoice {
                tenant_id: ctx.tenant_id,
                order_id,
                invoice_id,
                occurred_at: ctx.at,
            }),
        )?;
        committed += self.mirror_sales_order(ctx, order_id, invoice)?;
        Ok(committed)
    }

    /// Copy the invoice's lines and pricing onto its order.
    pub(crate) fn mirror_sales_order(
        &self,
        ctx: &CommandContext,
        order_id: SalesOrderId,
        invoice: &Invoice,
    ) -> LifecycleResult<usize> {
        self.dispatch::<SalesOrder>(
            ctx,
            order_id.0,
            SalesOrderCommand::MirrorInvoice(MirrorInvoice {
                tenant_id: ctx.tenant_id,
                order_id,
                invoice_id: invoice.id_typed().0,
                lines: invoice.lines().to_vec(),
                settings: invoice.settings().clone(),
                occurred_at: ctx.at,
            }),
        )
    }

    pub(crate) fn close_sales_order(&self, ctx: &CommandContext, order_id: SalesOrderId) -> LifecycleResult<usize> {
        self.dispatch::<SalesOrder>(
            ctx,
            order_id.0,
            SalesOrderCommand::CloseSalesOrder(CloseSalesOrder {
                tenant_id: ctx.tenant_id,
                order_id,
                occurred_at: ctx.at,
            }),
        )
    }

    pub(crate) fn unlink_sales_order(
        &self,
        ctx: &CommandContext,
        order_id: SalesOrderId,
        invoice_id: AggregateId,
    ) -> LifecycleResult<usize> {
        self.dispatch::<SalesOrder>(
            ctx,
            order_id.0,
            SalesOrderCommand::UnlinkInvoice(UnlinkInvoice {
                tenant_id: ctx.tenant_id,
                order_id,
                invoice_id,
                occurred_at: ctx.at,
            }),
        )
    }

    #[tracing::instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, number = %input.number), err)]
    pub fn create_purchase_order(
        &self,
        ctx: &CommandContext,
        input: NewPurchaseOrder,
    ) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        self.party_as(tenant_id, input.supplier_id, PartyKind::Supplier)?;
        let lines = self.resolve_lines(tenant_id, &input.lines, PriceBasis::Cost)?;
        let settings = match input.settings {
            Some(s) => s,
            None => self.default_settings(tenant_id)?,
        };
        let order_id = input.order_id.unwrap_or_else(|| PurchaseOrderId(AggregateId::new()));

        let mut committed = self.dispatch::<PurchaseOrder>(
            ctx,
            order_id.0,
            PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                tenant_id,
                order_id,
                number: input.number,
                supplier_id: input.supplier_id,
                warehouse_id: input.warehouse_id.unwrap_or_else(|| WarehouseId::main(tenant_id)),
                order_date: input.order_date,
                lines,
                settings,
                occurred_at: ctx.at,
            }),
        )?;
        if input.approve {
            committed += self.dispatch::<PurchaseOrder>(ctx, order_id.0, approve_order(ctx, order_id))?;
        }
        let order = self.load::<PurchaseOrder>(tenant_id, order_id.0)?;
        Ok(Outcome {
            committed,
            ..Outcome::new(order_id.0).with_status(order.status())
        })
    }

    pub fn approve_purchase_order(
        &self,
        ctx: &CommandContext,
        order_id: PurchaseOrderId,
    ) -> LifecycleResult<Outcome> {
        self.purchase_order_command(ctx, order_id, approve_order(ctx, order_id))
    }

    pub fn cancel_purchase_order(
        &self,
        ctx: &CommandContext,
        order_id: PurchaseOrderId,
        reason: Option<String>,
    ) -> LifecycleResult<Outcome> {
        self.purchase_order_command(
            ctx,
            order_id,
            PurchaseOrderCommand::CancelPurchaseOrder(CancelPurchaseOrder {
                tenant_id: ctx.tenant_id,
                order_id,
                reason,
                occurred_at: ctx.at,
            }),
        )
    }

    pub fn close_purchase_order(
        &self,
        ctx: &CommandContext,
        order_id: PurchaseOrderId,
    ) -> LifecycleResult<Outcome> {
        self.purchase_order_command(
            ctx,
            order_id,
            PurchaseOrderCommand::ClosePurchaseOrder(ClosePurchaseOrder {
                tenant_id: ctx.tenant_id,
                order_id,
                occurred_at: ctx.at,
            }),
        )
    }

    fn purchase_order_command(
        &self,
        ctx: &CommandContext,
        order_id: PurchaseOrderId,
        command: PurchaseOrderCommand,
    ) -> LifecycleResult<Outcome> {
        let (order, committed) = self.dispatch_loaded::<PurchaseOrder>(ctx, order_id.0, command)?;
        Ok(Outcome {
            committed,
            ..Outcome::new(order_id.0).with_status(order.status())
        })
    }
}

fn confirm_order(ctx: &CommandContext, order_id: SalesOrderId) -> SalesOrderCommand {
    SalesOrderCommand::ConfirmSalesOrder(ConfirmSalesOrder {
        tenant_id: ctx.tenant_id,
        order_id,
        occurred_at: ctx.at,
    })
}

fn approve_order(ctx: &CommandContext, order_id: PurchaseOrderId) -> PurchaseOrderCommand {
    PurchaseOrderCommand::ApprovePurchaseOrder(ApprovePurchaseOrder {
        tenant_id: ctx.tenant_id,
        order_id,
        occurred_at: ctx.at,
    })
}
