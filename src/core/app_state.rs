use anyhow::Result;
use reqwest::Client;

use crate::{
    api::{razorpay::RazorpayClient, shiprocket::ShiprocketClient},
    core::db::{self, DbPool},
};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub http_client: Client,
    pub shiprocket: ShiprocketClient,
    pub razorpay: RazorpayClient,
}

impl AppState {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db_pool = db::create_pool(database_url).await?;
        let http_client = Client::new();

        Ok(Self {
            shiprocket: ShiprocketClient::new(http_client.clone()),
            razorpay: RazorpayClient::new(http_client.clone()),
            db_pool,
            http_client,
        })
    }
}
