//! # Adapter Converter Rules
//!
//! Converter rules hand logical scans and modifications to the storage adapter that
//! owns the entity. There is one rule instance per adapter id:
//!
//! - [`AdapterScanRule`] asks [`Adapter::to_alg`] for a scan in the adapter's
//!   convention.
//! - [`AdapterModifyRule`] asks [`Adapter::get_modify`] for an implementation of an
//!   insert, update, delete or merge.
//!
//! Both operands only accept nodes in the logical convention whose entity names the
//! rule's adapter. An adapter returning `None` is a decline. An adapter id that is not
//! in the session's registry is an error that aborts the session.
//!
//! [`Adapter::to_alg`]: algx_core::adapter::Adapter::to_alg
//! [`Adapter::get_modify`]: algx_core::adapter::Adapter::get_modify

use algx_core::alg::{AlgKind, AlgKindTag};
use algx_core::error::PlannerResult;
use algx_core::pattern::Operand;
use algx_core::rule::{Rule, RuleCall, RuleType};
use algx_core::traits::{Convention, Trait};
use std::sync::Arc;
use tracing::debug;

/// Convert a logical scan of one adapter's entity into that adapter's scan.
pub struct AdapterScanRule {
    adapter: String,
    description: String,
    operand: Operand,
}

impl AdapterScanRule {
    pub fn new(adapter: impl Into<String>) -> Self {
        let adapter = adapter.into();
        let id = adapter.clone();
        Self {
            description: format!("AdapterScanRule({adapter})"),
            operand: Operand::of(AlgKindTag::Scan)
                .with_trait(Trait::Convention(Convention::Logical))
                .with_guard(move |n| matches!(n.kind(), AlgKind::Scan { entity } if entity.adapter == id)),
            adapter,
        }
    }
}

impl Rule for AdapterScanRule {
    fn description(&self) -> &str {
        &self.description
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()> {
        let scan = Arc::clone(call.rel(0));
        let adapter = call.adapters().require(&self.adapter)?;
        let traits = scan
            .traits()
            .clone()
            .with_convention(Convention::Adapter(self.adapter.clone()));
        match adapter.to_alg(&scan, &traits) {
            Some(converted) => call.transform_to(converted),
            None => debug!("{} declined: adapter cannot scan {}", self.description, scan.digest()),
        }
        Ok(())
    }
}

/// Implement a logical modification of one adapter's entity.
pub struct AdapterModifyRule {
    adapter: String,
    description: String,
    operand: Operand,
}

impl AdapterModifyRule {
    pub fn new(adapter: impl Into<String>) -> Self {
        let adapter = adapter.into();
        let id = adapter.clone();
        Self {
            description: format!("AdapterModifyRule({adapter})"),
            operand: Operand::of(AlgKindTag::Modify)
                .with_trait(Trait::Convention(Convention::Logical))
                .with_guard(move |n| matches!(n.kind(), AlgKind::Modify { entity, .. } if entity.adapter == id)),
            adapter,
        }
    }
}

impl Rule for AdapterModifyRule {
    fn description(&self) -> &str {
        &self.description
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> PlannerResult<()> {
        let modify = Arc::clone(call.rel(0));
        let AlgKind::Modify { entity, .. } = modify.kind() else {
            return Ok(());
        };
        let adapter = call.adapters().require(&self.adapter)?;
        let mut builder = call.builder();
        match adapter.get_modify(entity, &modify, &mut builder) {
            Some(implemented) => call.transform_to(implemented),
            None => debug!("{} declined: adapter cannot modify {}", self.description, entity),
        }
        Ok(())
    }
}
