use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AppendMessageReq {
    pub ct: String,
    pub iv: String,
}

#[derive(Serialize)]
pub struct AppendMessageResp {
    pub count: i64,
}

#[derive(Serialize)]
pub struct ListMessagesResp {
    pub messages: Vec<MessageItem>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageItem {
    pub ct: String,
    pub iv: String,
    pub created_ts: i64,
}
