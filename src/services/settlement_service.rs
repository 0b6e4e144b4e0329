use crate::database::sqlite::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::models::notification::NotificationType;
use crate::models::settlement::{PayeeKind, Settlement, SettlementStatus, WalletSummary};
use crate::services::notification_service::NotificationService;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct SettlementService {
    database: Arc<SqliteDatabase>,
    notifications: Arc<NotificationService>,
}

impl SettlementService {
    pub fn new(database: Arc<SqliteDatabase>, notifications: Arc<NotificationService>) -> Self {
        Self {
            database,
            notifications,
        }
    }

    pub async fn list(
        &self,
        status: Option<SettlementStatus>,
        payee: Option<(PayeeKind, Uuid)>,
        order_id: Option<&Uuid>,
    ) -> Result<Vec<Settlement>> {
        self.database.list_settlements(status, payee, order_id).await
    }

    pub async fn approve(&self, settlement_id: &Uuid, admin_id: &Uuid) -> Result<Settlement> {
        let mut approved = self.approve_many(&[*settlement_id], admin_id).await?;
        approved
            .pop()
            .ok_or_else(|| AppError::InternalError("Approval returned no settlement".to_string()))
    }

    /// Approves all of `ids` in one transaction and credits each payee's wallet.
    pub async fn approve_many(&self, ids: &[Uuid], admin_id: &Uuid) -> Result<Vec<Settlement>> {
        if ids.is_empty() {
            return Err(AppError::ValidationError("No settlements to approve".to_string()));
        }
        let mut unique = ids.to_vec();
        unique.sort();
        unique.dedup();

        let approved = self
            .database
            .approve_settlements(&unique, admin_id, Utc::now())
            .await?;

        for settlement in &approved {
            if let Err(e) = self.notify_payee(settlement).await {
                warn!(action = "settlement_notify_failed", settlement_id = %settlement.id, error = %e);
            }
        }
        Ok(approved)
    }

    /// Approves every pending settlement.
    pub async fn approve_all_pending(&self, admin_id: &Uuid) -> Result<Vec<Settlement>> {
        let pending: Vec<Uuid> = self
            .database
            .list_settlements(Some(SettlementStatus::Pending), None, None)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        if pending.is_empty() {
            info!(action = "settlements_none_pending");
            return Ok(Vec::new());
        }
        self.approve_many(&pending, admin_id).await
    }

    pub async fn wallet(&self, payee_kind: PayeeKind, payee_id: &Uuid) -> Result<WalletSummary> {
        let transactions = self
            .database
            .get_wallet_transactions(payee_kind, payee_id)
            .await?;
        let pending_amount = self
            .database
            .list_settlements(Some(SettlementStatus::Pending), Some((payee_kind, *payee_id)), None)
            .await?
            .iter()
            .map(|s| s.amount)
            .sum::<Decimal>();
        let balance = transactions.iter().map(|t| t.amount).sum::<Decimal>();

        Ok(WalletSummary {
            payee_kind,
            payee_id: *payee_id,
            balance,
            pending_amount,
            transactions,
        })
    }

    async fn notify_payee(&self, settlement: &Settlement) -> Result<()> {
        let profile_id = match settlement.payee_kind {
            PayeeKind::Cook => self.database.get_cook(&settlement.payee_id).await?.profile_id,
            PayeeKind::Delivery => {
                self.database
                    .get_delivery_staff(&settlement.payee_id)
                    .await?
                    .profile_id
            }
        };
        self.notifications
            .notify(
                &profile_id,
                NotificationType::SettlementApproved,
                "Settlement approved".to_string(),
                format!("{} has been credited to your wallet", settlement.amount),
                Some(serde_json::json!({
                    "settlement_id": settlement.id,
                    "order_id": settlement.order_id,
                    "amount": settlement.amount,
                })),
            )
            .await?;
        Ok(())
    }
}
