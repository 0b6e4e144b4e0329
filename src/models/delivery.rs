use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeliveryStaff {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub panchayats: Vec<String>,
    /// Empty means every ward of the listed panchayats.
    pub wards: Vec<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl DeliveryStaff {
    pub fn covers(&self, panchayat: &str, ward: i32) -> bool {
        self.is_active
            && self.panchayats.iter().any(|p| p.eq_ignore_ascii_case(panchayat))
            && (self.wards.is_empty() || self.wards.contains(&ward))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staff(panchayats: &[&str], wards: &[i32]) -> DeliveryStaff {
        DeliveryStaff {
            id: Uuid::new_v4(),
            profile_id: Uuid::new_v4(),
            panchayats: panchayats.iter().map(|p| p.to_string()).collect(),
            wards: wards.to_vec(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn matches_panchayat_and_ward() {
        let s = staff(&["Kodakara"], &[3, 4]);
        assert!(s.covers("kodakara", 3));
        assert!(!s.covers("Kodakara", 5));
        assert!(!s.covers("Mala", 3));
    }

    #[test]
    fn empty_ward_list_covers_whole_panchayat() {
        let s = staff(&["Mala"], &[]);
        assert!(s.covers("Mala", 17));
    }

    #[test]
    fn inactive_staff_covers_nothing() {
        let mut s = staff(&["Mala"], &[]);
        s.is_active = false;
        assert!(!s.covers("Mala", 1));
    }
}
