//! # Translation
//!
//! Turns an [`ApiSnapshot`] into a [`ProxyGraph`] plus per-resource findings.
//! Translation never fails because of one bad object: problems become
//! diagnostics on the object and only the affected fragment is dropped or left
//! for the sanitizers to repair.

pub mod graph;
mod translator;

pub use graph::{
    ClusterFragment, ClusterWeight, DanglingReference, Endpoint, EndpointSet, Fragment,
    FragmentKind, FragmentRef, ListenerFragment, ProxyGraph, RouteFragment, RouteFragmentAction,
    RouteTableFragment, SniCertificate, TlsMaterial, VirtualHostFragment,
};
pub use translator::{cluster_name, listener_name, route_table_name, DefaultTranslator};

use crate::domain::{ApiSnapshot, DiagnosticReport};
use crate::errors::Result;

/// Output of one translation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Translation {
    pub graph: ProxyGraph,
    pub report: DiagnosticReport,
}

pub trait Translator: Send + Sync {
    /// `Err` means the whole cycle failed; per-object problems belong in the report
    fn translate(&self, snapshot: &ApiSnapshot) -> Result<Translation>;
}
