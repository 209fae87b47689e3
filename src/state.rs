//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::analytics::DashboardService;
use crate::loan_service::LoanService;
use crate::payment_service::PaymentService;
use crate::reconciler::Reconciler;
use crate::storage::LocalImageStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub loan_service: Arc<LoanService>,
    pub payment_service: Arc<PaymentService>,
    pub dashboard_service: Arc<DashboardService>,
    pub reconciler: Arc<Reconciler>,
    pub image_store: Arc<LocalImageStore>,
}

impl AppState {
    pub fn new(
        loan_service: Arc<LoanService>,
        payment_service: Arc<PaymentService>,
        dashboard_service: Arc<DashboardService>,
        reconciler: Arc<Reconciler>,
        image_store: Arc<LocalImageStore>,
    ) -> Self {
        Self {
            loan_service,
            payment_service,
            dashboard_service,
            reconciler,
            image_store,
        }
    }
}

impl FromRef<AppState> for Arc<LoanService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.loan_service.clone()
    }
}

impl FromRef<AppState> for Arc<PaymentService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.payment_service.clone()
    }
}

impl FromRef<AppState> for Arc<DashboardService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.dashboard_service.clone()
    }
}

impl FromRef<AppState> for Arc<Reconciler> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.reconciler.clone()
    }
}

impl FromRef<AppState> for Arc<LocalImageStore> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.image_store.clone()
    }
}
