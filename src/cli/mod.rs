mod commands;
pub use commands::*;

use crate::errors::{AppError, Result};
use crate::models::order::OrderDetails;
use crate::models::settlement::{Settlement, SettlementStatus};
use colored::Colorize;
use std::io::{self, BufRead, Write};

pub struct CLI;

impl CLI {
    pub fn print_success(message: &str) {
        println!("{} {}", "✅".green(), message.green());
    }

    pub fn print_error(message: &str) {
        println!("{} {}", "❌".red(), message.red());
    }

    pub fn print_info(message: &str) {
        println!("{} {}", "ℹ️".blue(), message.blue());
    }

    /// Asks a yes/no question on stdin until it gets an answer.
    pub fn confirm_action(prompt: &str) -> Result<bool> {
        let stdin = io::stdin();
        Self::confirm_from(prompt, &mut stdin.lock())
    }

    /// End of input counts as "no".
    pub fn confirm_from<R: BufRead>(prompt: &str, input: &mut R) -> Result<bool> {
        loop {
            print!("{} ", format!("{} (y/n):", prompt).cyan());
            io::stdout()
                .flush()
                .map_err(|e| AppError::InternalError(format!("IO error: {}", e)))?;

            let mut answer = String::new();
            let read = input
                .read_line(&mut answer)
                .map_err(|e| AppError::InternalError(format!("Failed to read input: {}", e)))?;
            if read == 0 {
                println!();
                return Ok(false);
            }
            match answer.trim().to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => Self::print_error("Please enter 'y' for yes or 'n' for no"),
            }
        }
    }

    pub fn print_order(details: &OrderDetails) {
        let order = &details.order;
        println!("\n{}", "📦 Order".cyan().bold());
        println!("ID: {}", order.id.to_string().yellow());
        println!("Status: {}", order.status.to_string().green());
        println!("Service: {}", order.service_type);
        println!("Deliver to: {} (ward {}, {})", order.delivery_address, order.ward, order.panchayat);
        println!("Total: {} (delivery {})", order.total_amount, order.delivery_charge);
        if let Some(event) = &order.event_details {
            println!(
                "Event: {} at {} on {} for {} guests",
                event.event_type, event.venue, event.event_date, event.guest_count
            );
        }

        println!("\n{}", "Items:".cyan().bold());
        for item in &details.items {
            let cook = match item.cook_id {
                Some(id) => id.to_string(),
                None => "unassigned".red().to_string(),
            };
            println!(
                "  {} x{} @ {} = {}  [cook: {}]",
                item.food_name, item.quantity, item.unit_price, item.total_price, cook
            );
        }

        if !details.assignments.is_empty() {
            println!("\n{}", "Cook assignments:".cyan().bold());
            for a in &details.assignments {
                println!(
                    "  {} cook={} {} (respond by {})",
                    a.id,
                    a.cook_id,
                    a.status.as_str(),
                    a.respond_by.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }

        if let Some(vehicle) = &details.vehicle {
            println!("\n{} {} {}", "Vehicle:".cyan().bold(), vehicle.vehicle_type, vehicle.vehicle_number);
        }
    }

    pub fn print_settlements(settlements: &[Settlement]) {
        println!("\n{}", "💰 Settlements:".cyan().bold());
        for s in settlements {
            let status = match s.status {
                SettlementStatus::Pending => s.status.as_str().yellow(),
                SettlementStatus::Approved => s.status.as_str().green(),
            };
            println!(
                "{}  order={}  {}:{}  {}  {}",
                s.id,
                s.order_id,
                s.payee_kind.as_str(),
                s.payee_id,
                s.amount,
                status
            );
        }
        let pending: rust_decimal::Decimal = settlements
            .iter()
            .filter(|s| s.status == SettlementStatus::Pending)
            .map(|s| s.amount)
            .sum();
        println!("{} {}", "Pending total:".bold(), pending);
    }

    pub fn print_help() {
        println!("\n{}", "🍲 FoodHub commands".bright_yellow().bold());
        println!("  serve");
        println!("    Start the HTTP API (default when no command is given)");
        println!("  create-admin <full_name> <mobile_number> <password>");
        println!("    Create an administrator profile");
        println!("  orders show <order_id>");
        println!("    Print an order with its items, cook assignments and vehicle");
        println!("  settlements list [pending|approved]");
        println!("    List settlements, optionally by status");
        println!("  settlements approve-all <admin_mobile>");
        println!("    Approve every pending settlement on behalf of an admin");
        println!("  sweep");
        println!("    Time out cook assignments whose response window has closed");
        println!("  help");
        println!("    Show this help message");
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn closed_input_declines() {
        let mut input = Cursor::new(Vec::new());
        assert!(!CLI::confirm_from("Approve?", &mut input).unwrap());
    }

    #[test]
    fn retries_until_a_clear_answer() {
        let mut input = Cursor::new(b"maybe\nYES\n".to_vec());
        assert!(CLI::confirm_from("Approve?", &mut input).unwrap());

        let mut input = Cursor::new(b"what\n".to_vec());
        assert!(!CLI::confirm_from("Approve?", &mut input).unwrap());
    }
}
