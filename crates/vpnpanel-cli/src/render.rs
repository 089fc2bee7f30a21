use std::collections::HashMap;

use vpnpanel_client::{AdminFeedSnapshot, BlobUrl, ProfileView, ProofAction, SelfFeedSnapshot};
use vpnpanel_types::{PaymentProof, PaymentProofUser};

pub fn profile(view: &ProfileView, admin_hint: bool) {
    println!("{} (id {})", view.display_name, view.user_id);
    if let Some(photo) = &view.photo {
        println!("  photo:        {}", photo);
    }
    println!("  expires:      {} ({} days left)", view.formatted_expiry(), view.days_left());
    match &view.subscription_url {
        Some(url) => println!("  subscription: {}", url),
        None => println!("  subscription: not issued yet"),
    }
    if admin_hint && view.can_view_admin_panel {
        println!("  admin panel:  vpnpanel admin users");
    }
}

fn proof_line(proof: &PaymentProof, image: Option<&BlobUrl>) -> String {
    let mut line = format!(
        "#{:<5} {:<9} {}",
        proof.id,
        proof.status.as_str(),
        proof.created_at.format("%d %b %Y, %H:%M")
    );
    if let Some(reviewed) = proof.reviewed_at {
        let by = if proof.reviewed_by_username.is_empty() {
            proof.reviewed_by.map(|id| id.to_string()).unwrap_or_default()
        } else {
            proof.reviewed_by_username.clone()
        };
        line.push_str(&format!("  reviewed {} by {}", reviewed.format("%d %b %Y, %H:%M"), by));
    }
    match image {
        Some(url) => line.push_str(&format!("  image {}", url)),
        None if proof.has_file() => line.push_str("  image unavailable"),
        None => {}
    }
    line
}

pub fn proofs(items: &[PaymentProof], images: &HashMap<i64, BlobUrl>) {
    if items.is_empty() {
        println!("No submissions yet.");
        return;
    }
    for proof in items {
        println!("{}", proof_line(proof, images.get(&proof.id)));
    }
}

pub fn self_feed(snap: &SelfFeedSnapshot, images: &HashMap<i64, BlobUrl>) {
    if let Some(err) = &snap.error {
        println!("! {}", err);
    }
    if let Some(err) = &snap.action_error {
        println!("! {}", err);
    }
    proofs(&snap.items, images);
}

pub fn users(users: &[PaymentProofUser], selected: Option<i64>) {
    if users.is_empty() {
        println!("No submissions from any user.");
        return;
    }
    for user in users {
        let marker = if Some(user.user_id) == selected { '>' } else { ' ' };
        let name = if user.username.is_empty() { "-" } else { user.username.as_str() };
        println!("{} {:<12} {:<24} {} pending", marker, user.user_id, name, user.pending_count);
    }
}

pub fn admin_feed(snap: &AdminFeedSnapshot, images: &HashMap<i64, BlobUrl>) {
    if let Some(err) = &snap.error {
        println!("! {}", err);
    }
    if let Some(err) = &snap.action_error {
        println!("! {}", err);
    }
    users(&snap.users, snap.selected_user_id);
    println!();
    match snap.selected_user() {
        Some(user) => println!("Submissions of {} ({}):", user.username, user.user_id),
        None => println!("Submissions:"),
    }
    for proof in &snap.proofs {
        let actions: Vec<&str> = [
            (ProofAction::Approve, "approve"),
            (ProofAction::Reject, "reject"),
            (ProofAction::ResetToPending, "reset"),
        ]
        .into_iter()
        .filter(|(action, _)| snap.is_action_enabled(proof, *action))
        .map(|(_, name)| name)
        .collect();
        println!("{}  [{}]", proof_line(proof, images.get(&proof.id)), actions.join("|"));
    }
}

/// Clear the terminal before redrawing a watched screen.
pub fn clear() {
    print!("\x1b[2J\x1b[H");
}
