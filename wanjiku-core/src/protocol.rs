/// Operations the router understands. HTTP handlers translate their inputs
/// into one of these and hand it to `router::handle_request`.
#[derive(Debug, Clone)]
pub enum WanjikuRequest {
    Health,
    Ussd {
        session_id: String,
        phone_number: String,
        text: String,
    },
    EndSession {
        session_id: String,
    },
    GetSession {
        session_id: String,
    },
    ListSessions {
        limit: Option<usize>,
    },
    Menus,
    SendSms {
        phone_number: String,
        message: String,
    },
    IncomingSms {
        phone_number: String,
        message: String,
    },
    ListMessages {
        limit: Option<usize>,
    },
}

/// Router result: `data` on success, `error` otherwise.
#[derive(Debug)]
pub struct WanjikuResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl WanjikuResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_constructors() {
        let ok = WanjikuResponse::ok(serde_json::json!({"count": 0}));
        assert!(ok.is_ok());
        assert_eq!(ok.data.unwrap()["count"], 0);

        let err = WanjikuResponse::err("Session not found");
        assert!(!err.is_ok());
        assert_eq!(err.error.as_deref(), Some("Session not found"));
        assert!(err.data.is_none());
    }
}
