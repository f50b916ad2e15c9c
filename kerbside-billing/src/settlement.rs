use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use kerbside_core::repository::{PaymentRepository, SessionRepository};
use kerbside_core::{CoreError, CoreResult};
use kerbside_shared::models::{Payment, PaymentMethod, PaymentStatus};

/// Records completed payments against sessions.
///
/// The gateway is simulated: recording cannot fail on payment grounds, every
/// payment settles as completed with a freshly generated transaction
/// reference. The per-network entry points exist for the API boundary and
/// funnel into the same recording path with only the method tag differing.
pub struct PaymentRecorder {
    payments: Arc<dyn PaymentRepository>,
    sessions: Arc<dyn SessionRepository>,
}

impl PaymentRecorder {
    pub fn new(payments: Arc<dyn PaymentRepository>, sessions: Arc<dyn SessionRepository>) -> Self {
        Self { payments, sessions }
    }

    pub async fn record_payment(
        &self,
        session_id: Uuid,
        amount: f64,
        method: PaymentMethod,
    ) -> CoreResult<Payment> {
        self.sessions
            .get(session_id)
            .await?
            .ok_or_else(|| CoreError::not_found("session", session_id))?;

        let transaction_ref = format!("TXN-{}", Uuid::new_v4());
        let payment = Payment::completed(session_id, amount, method, transaction_ref);

        self.payments.create(&payment).await?;
        self.sessions
            .set_payment_status(session_id, PaymentStatus::Completed)
            .await?;

        info!(%session_id, payment_id = %payment.id, method = method.as_str(),
            "payment recorded");
        Ok(payment)
    }

    /// M-Pesa checkout. The gateway response blob is accepted but not
    /// verified in the simulated environment.
    pub async fn record_mpesa_payment(
        &self,
        session_id: Uuid,
        amount: f64,
        _gateway_response: &str,
    ) -> CoreResult<Payment> {
        self.record_payment(session_id, amount, PaymentMethod::Mpesa)
            .await
    }

    /// PayPal checkout, same funnel
    pub async fn record_paypal_payment(
        &self,
        session_id: Uuid,
        amount: f64,
        _gateway_response: &str,
    ) -> CoreResult<Payment> {
        self.record_payment(session_id, amount, PaymentMethod::Paypal)
            .await
    }

    pub async fn payments_for_session(&self, session_id: Uuid) -> CoreResult<Vec<Payment>> {
        self.payments.list_by_session(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kerbside_shared::models::Session;
    use kerbside_store::Store;

    async fn setup() -> (Store, PaymentRecorder, Session) {
        let store = Store::in_memory().await.unwrap();
        let recorder = PaymentRecorder::new(store.payments.clone(), store.sessions.clone());

        let session = Session::start(Uuid::new_v4(), Uuid::new_v4(), None);
        store.sessions.create(&session).await.unwrap();

        (store, recorder, session)
    }

    #[tokio::test]
    async fn test_payment_completes_and_marks_session() {
        let (store, recorder, session) = setup().await;

        let payment = recorder
            .record_payment(session.id, 12.0, PaymentMethod::Mpesa)
            .await
            .unwrap();

        assert_eq!(payment.status, PaymentStatus::Completed);
        assert!(payment.transaction_ref.starts_with("TXN-"));

        let stored = store.sessions.get(session.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_references_are_unique_across_attempts() {
        let (_store, recorder, session) = setup().await;

        let first = recorder
            .record_payment(session.id, 12.0, PaymentMethod::Mpesa)
            .await
            .unwrap();
        let second = recorder
            .record_payment(session.id, 12.0, PaymentMethod::Mpesa)
            .await
            .unwrap();

        assert_ne!(first.transaction_ref, second.transaction_ref);
        assert_eq!(
            recorder.payments_for_session(session.id).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_network_paths_share_the_funnel() {
        let (_store, recorder, session) = setup().await;

        let mpesa = recorder
            .record_mpesa_payment(session.id, 8.5, "{\"receipt\":\"ABC123\"}")
            .await
            .unwrap();
        let paypal = recorder
            .record_paypal_payment(session.id, 8.5, "{\"orderID\":\"XYZ\"}")
            .await
            .unwrap();

        assert_eq!(mpesa.method, PaymentMethod::Mpesa);
        assert_eq!(paypal.method, PaymentMethod::Paypal);
        assert_eq!(mpesa.status, PaymentStatus::Completed);
        assert_eq!(paypal.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_missing_session_is_not_found() {
        let (_store, recorder, _session) = setup().await;

        let err = recorder
            .record_payment(Uuid::new_v4(), 5.0, PaymentMethod::Paypal)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }
}
