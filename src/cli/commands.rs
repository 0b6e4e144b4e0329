use crate::api::AppState;
use crate::cli::CLI;
use crate::errors::{AppError, Result};
use crate::models::profile::Role;
use crate::models::settlement::SettlementStatus;
use crate::services::auth::NewProfile;
use chrono::Utc;
use colored::Colorize;
use std::str::FromStr;
use uuid::Uuid;

pub async fn handle_create_admin_command(state: &AppState, args: &[String]) -> Result<()> {
    if args.len() < 3 {
        println!("{}", "Error: Missing required arguments".red().bold());
        println!("Usage: create-admin <full_name> <mobile_number> <password>");
        return Ok(());
    }

    let profile = state
        .auth
        .create_profile(NewProfile {
            full_name: args[0].clone(),
            mobile_number: args[1].clone(),
            password: args[2].clone(),
            role: Role::Admin,
            panchayat: None,
            ward: None,
        })
        .await?;

    CLI::print_success(&format!("Admin {} created", profile.full_name));
    println!("Profile ID: {}", profile.id.to_string().yellow());
    Ok(())
}

pub async fn handle_orders_command(state: &AppState, args: &[String]) -> Result<()> {
    match args.first().map(String::as_str) {
        Some("show") => {
            let Some(raw_id) = args.get(1) else {
                println!("{}", "Error: Missing order id".red().bold());
                println!("Usage: orders show <order_id>");
                return Ok(());
            };
            let order_id = Uuid::parse_str(raw_id)
                .map_err(|_| AppError::ValidationError("Invalid order id".to_string()))?;
            let details = state.orders.get_details(&order_id).await?;
            CLI::print_order(&details);
        }
        _ => {
            println!("{}", "Orders command usage:".cyan().bold());
            println!("  orders show <order_id>");
        }
    }
    Ok(())
}

pub async fn handle_settlements_command(state: &AppState, args: &[String]) -> Result<()> {
    match args.first().map(String::as_str) {
        Some("list") => {
            let status = args
                .get(1)
                .map(|raw| SettlementStatus::from_str(raw))
                .transpose()?;
            let settlements = state.settlements.list(status, None, None).await?;
            if settlements.is_empty() {
                println!("{}", "No settlements found.".yellow());
                return Ok(());
            }
            CLI::print_settlements(&settlements);
        }
        Some("approve-all") => {
            let Some(mobile) = args.get(1) else {
                println!("{}", "Error: Missing admin mobile number".red().bold());
                println!("Usage: settlements approve-all <admin_mobile>");
                return Ok(());
            };
            let admin = state
                .auth
                .find_by_mobile(mobile)
                .await?
                .ok_or_else(|| AppError::NotFound("Admin profile not found".to_string()))?;
            if admin.role != Role::Admin {
                return Err(AppError::Forbidden("Only admins approve settlements".to_string()));
            }

            if !CLI::confirm_action("Approve every pending settlement?")? {
                println!("{}", "Approval cancelled.".yellow());
                return Ok(());
            }
            let approved = state.settlements.approve_all_pending(&admin.id).await?;
            CLI::print_success(&format!("Approved {} settlement(s)", approved.len()));
        }
        _ => {
            println!("{}", "Settlements command usage:".cyan().bold());
            println!("  settlements list [pending|approved]");
            println!("  settlements approve-all <admin_mobile>");
        }
    }
    Ok(())
}

pub async fn handle_sweep_command(state: &AppState) -> Result<()> {
    let report = state.orders.sweep(Utc::now()).await?;
    CLI::print_info(&format!(
        "Timed out {} assignment(s), dropped {} expired alert(s)",
        report.timed_out, report.alerts_dropped
    ));
    Ok(())
}
