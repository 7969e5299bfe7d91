//! Order Fulfillment Workflow
//!
//! The reference workflow this engine ships with: an incoming order is a
//! list of line items under `$.order`, each `{ "sku": ..., "qty": ... }`.
//!
//! 1. `CheckStock` fans out over the order, checking availability per
//!    line item; one unavailable item fails the whole order before any
//!    side effect runs.
//! 2. `ProcessOrder` runs two branches in parallel: one decrements the
//!    stock per line item, the other writes the order record and yields
//!    a receipt with the order id.
//! 3. `OrderAccepted` concludes with the final document.

use crate::document::DataPath;
use crate::invoker::{CHECK_STOCK, CREATE_ORDER, UPDATE_STOCK};
use crate::workflow::{
    MapState, ParallelState, State, SucceedState, TaskState, WorkflowDefinition,
};

/// Path of the order line-item list in the input document.
pub const ORDER_PATH: &str = "$.order";

/// Builds the order fulfillment workflow definition.
pub fn order_workflow() -> WorkflowDefinition {
    let check_item = State::Task(TaskState::new(CHECK_STOCK));
    let update_item = State::Task(TaskState::new(UPDATE_STOCK));

    let update_stock_branch = WorkflowDefinition::new("update-stock", "UpdateStock").with_state(
        "UpdateStock",
        State::Map(MapState::new(DataPath::from_key("order"), update_item)),
    );
    let create_order_branch = WorkflowDefinition::new("create-order", "CreateOrder").with_state(
        "CreateOrder",
        State::Task(TaskState::new(CREATE_ORDER).with_result_path(DataPath::from_key("receipt"))),
    );

    WorkflowDefinition::new("order-fulfillment", "CheckStock")
        .with_state(
            "CheckStock",
            State::Map(
                MapState::new(DataPath::from_key("order"), check_item).with_next("ProcessOrder"),
            ),
        )
        .with_state(
            "ProcessOrder",
            State::Parallel(
                ParallelState::new(vec![update_stock_branch, create_order_branch])
                    .with_result_path(DataPath::from_key("results"))
                    .with_next("OrderAccepted"),
            ),
        )
        .with_state("OrderAccepted", State::Succeed(SucceedState::default()))
}
