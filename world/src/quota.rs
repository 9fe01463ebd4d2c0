//! Pennies and build-quota accounting.
//!
//! Quota counters live in the attribute store (A_QUOTA holds the grant,
//! A_RQUOTA the remaining balance) so they checkpoint with everything
//! else; pennies live on the object record.

use tracing::debug;

use crate::attr::{AttrFlags, AttrValue, A_QUOTA, A_RQUOTA};
use crate::object::{Dbref, Powers};
use crate::world::World;

/// What stopped a fee from being paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeShortfall {
    Money,
    Quota,
}

fn read_counter(w: &mut World, who: Dbref, a: u16) -> i32 {
    w.atr_get(who, a).text.trim().parse().unwrap_or(0)
}

fn write_counter(w: &mut World, who: Dbref, a: u16, value: i32) {
    let owner = w.db.owner(who);
    w.atr_set_raw(
        who,
        a,
        AttrValue::new(value.to_string(), owner, AttrFlags::empty()),
    );
}

/// Charge `cost` pennies against `who`'s owner. Wizards and FREE_MONEY
/// holders are never charged.
pub fn payfor(w: &mut World, who: Dbref, cost: i32) -> bool {
    let owner = w.db.owner(who);
    if w.db.wizard(owner) || w.db.has_power(owner, Powers::FREE_MONEY) {
        return true;
    }
    let pennies = w.db.pennies(owner);
    if pennies < cost {
        return false;
    }
    if let Some(o) = w.db.fetch_mut(owner) {
        o.pennies = pennies - cost;
    }
    debug!(who = owner, cost, "charged");
    true
}

pub fn giveto(w: &mut World, who: Dbref, pennies: i32) {
    let owner = w.db.owner(who);
    if w.db.wizard(owner) || w.db.has_power(owner, Powers::FREE_MONEY) {
        return;
    }
    if let Some(o) = w.db.fetch_mut(owner) {
        o.pennies = o.pennies.saturating_add(pennies);
    }
}

/// Consume one unit of remaining quota.
pub fn pay_quota(w: &mut World, who: Dbref, cost: i32) -> bool {
    if !w.cfg.costs.quotas {
        return true;
    }
    let owner = w.db.owner(who);
    if w.db.has_power(owner, Powers::FREE_QUOTA) || w.db.wizard(owner) {
        return true;
    }
    let remaining = read_counter(w, owner, A_RQUOTA);
    if remaining < cost {
        return false;
    }
    write_counter(w, owner, A_RQUOTA, remaining - cost);
    true
}

/// Return quota on destruction or admin grant.
pub fn add_quota(w: &mut World, who: Dbref, payment: i32) {
    if !w.cfg.costs.quotas {
        return;
    }
    let owner = w.db.owner(who);
    let remaining = read_counter(w, owner, A_RQUOTA);
    write_counter(w, owner, A_RQUOTA, remaining + payment);
}

/// Initialize the quota grant for a fresh player.
pub fn grant_quota(w: &mut World, who: Dbref, amount: i32) {
    write_counter(w, who, A_QUOTA, amount);
    write_counter(w, who, A_RQUOTA, amount);
}

/// Combined affordability check: pennies first, then quota. Nothing is
/// charged unless both succeed.
pub fn canpayfees(w: &mut World, who: Dbref, pennies: i32, quota: i32) -> Result<(), FeeShortfall> {
    let owner = w.db.owner(who);
    let privileged = w.db.wizard(owner) || w.db.has_power(owner, Powers::FREE_MONEY);
    if !privileged && w.db.pennies(owner) < pennies {
        return Err(FeeShortfall::Money);
    }
    if w.cfg.costs.quotas
        && !w.db.wizard(owner)
        && !w.db.has_power(owner, Powers::FREE_QUOTA)
        && read_counter(w, owner, A_RQUOTA) < quota
    {
        return Err(FeeShortfall::Quota);
    }
    if !payfor(w, who, pennies) {
        return Err(FeeShortfall::Money);
    }
    if !pay_quota(w, who, quota) {
        // Refund the pennies taken a moment ago.
        giveto(w, who, pennies);
        return Err(FeeShortfall::Quota);
    }
    Ok(())
}

/// Password sanity: non-empty printable ASCII with at least one letter.
pub fn ok_password(password: &str) -> Result<(), &'static str> {
    if password.is_empty() {
        return Err("Null passwords are not allowed.");
    }
    if !password.chars().all(|c| c.is_ascii_graphic()) {
        return Err("Illegal character in password.");
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err("Passwords must contain at least one letter.");
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use common::config::MuxConfig;
    use crate::object::{ObjectType, NOTHING};

    fn world_with_quotas() -> (World, Dbref) {
        let mut cfg = MuxConfig::default();
        cfg.costs.quotas = true;
        let mut w = World::new_in_memory(cfg);
        let _room = w.create_object(ObjectType::Room, NOTHING, "Limbo").unwrap();
        let _god = w.create_object(ObjectType::Player, NOTHING, "God").unwrap();
        let alice = w
            .create_object(ObjectType::Player, NOTHING, "Alice")
            .unwrap();
        if let Some(o) = w.db.fetch_mut(alice) {
            o.pennies = 50;
        }
        grant_quota(&mut w, alice, 5);
        (w, alice)
    }

    #[test]
    fn test_payfor_deducts() {
        let (mut w, alice) = world_with_quotas();
        assert!(payfor(&mut w, alice, 30));
        assert_eq!(w.db.pennies(alice), 20);
        assert!(!payfor(&mut w, alice, 30));
        assert_eq!(w.db.pennies(alice), 20);
        giveto(&mut w, alice, 15);
        assert_eq!(w.db.pennies(alice), 35);
    }

    #[test]
    fn test_quota_drains_and_refills() {
        let (mut w, alice) = world_with_quotas();
        for _ in 0..5 {
            assert!(pay_quota(&mut w, alice, 1));
        }
        assert!(!pay_quota(&mut w, alice, 1));
        add_quota(&mut w, alice, 2);
        assert!(pay_quota(&mut w, alice, 1));
    }

    #[test]
    fn test_canpayfees_refunds_on_quota_shortfall() {
        let (mut w, alice) = world_with_quotas();
        // Exhaust the quota, leaving the money.
        for _ in 0..5 {
            pay_quota(&mut w, alice, 1);
        }
        let before = w.db.pennies(alice);
        assert_eq!(
            canpayfees(&mut w, alice, 10, 1),
            Err(FeeShortfall::Quota)
        );
        assert_eq!(w.db.pennies(alice), before);
    }

    #[test]
    fn test_wizards_are_never_charged() {
        let (mut w, _alice) = world_with_quotas();
        let god = 1;
        assert!(payfor(&mut w, god, 1_000_000));
        assert!(pay_quota(&mut w, god, 1_000_000));
    }

    #[test]
    fn test_ok_password() {
        assert!(ok_password("hunter2").is_ok());
        assert!(ok_password("").is_err());
        assert!(ok_password("12345").is_err());
        assert!(ok_password("with space").is_err());
        assert!(ok_password("caf\u{e9}").is_err());
    }
}
