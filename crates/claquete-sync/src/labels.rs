//! User-facing (pt-BR) texts for realtime notifications.

use claquete_types::models::OfferStatus;
use claquete_types::notifications::Toast;

pub const NEW_OFFER_TITLE: &str = "Nova proposta recebida";
pub const NEW_MESSAGE_TITLE: &str = "Nova mensagem";
pub const NEW_MESSAGE_BODY: &str = "Você recebeu uma nova mensagem";

/// Label for a status change seen by the client side of an offer.
pub fn status_label(status: OfferStatus) -> &'static str {
    match status {
        OfferStatus::Accepted => "aceita",
        OfferStatus::Rejected => "recusada",
        OfferStatus::CounterOffer => "contraproposta recebida",
        _ => "atualizada",
    }
}

pub fn new_offer_toast(title: &str) -> Toast {
    Toast::info(NEW_OFFER_TITLE, title)
}

pub fn status_toast(title: &str, status: OfferStatus) -> Toast {
    Toast::info(format!("Proposta {}", status_label(status)), title)
}

pub fn new_message_toast() -> Toast {
    Toast::info(NEW_MESSAGE_TITLE, NEW_MESSAGE_BODY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapped_labels() {
        assert_eq!(status_label(OfferStatus::Accepted), "aceita");
        assert_eq!(status_label(OfferStatus::Rejected), "recusada");
        assert_eq!(status_label(OfferStatus::CounterOffer), "contraproposta recebida");
    }

    #[test]
    fn unmapped_statuses_fall_back() {
        let archived: OfferStatus = serde_json::from_str("\"archived\"").unwrap();
        assert_eq!(status_label(archived), "atualizada");
        assert_eq!(status_label(OfferStatus::Pending), "atualizada");
        assert_eq!(status_label(OfferStatus::Completed), "atualizada");
    }

    #[test]
    fn status_toast_text() {
        let toast = status_toast("Clipe musical", OfferStatus::Accepted);
        assert_eq!(toast.title, "Proposta aceita");
        assert_eq!(toast.description, "Clipe musical");
    }
}
