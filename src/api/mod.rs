pub mod razorpay;
pub mod shiprocket;

pub struct ApiUrls {
    pub shiprocket_base_url: String,
    pub razorpay_base_url: String,
}

impl ApiUrls {
    pub fn init() -> Self {
        Self {
            shiprocket_base_url: Self::get_shiprocket_base_url(),
            razorpay_base_url: Self::get_razorpay_base_url(),
        }
    }

    pub fn get_shiprocket_base_url() -> String {
        std::env::var("SHIPROCKET_BASE_URL")
            .unwrap_or("https://apiv2.shiprocket.in".to_string())
    }

    pub fn get_razorpay_base_url() -> String {
        std::env::var("RAZORPAY_BASE_URL").unwrap_or("https://api.razorpay.com".to_string())
    }
}
