use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_int_counter, CounterVec, IntCounter};

lazy_static! {
    pub static ref SIGNUPS_COUNTER: IntCounter = register_int_counter!(
        "api_signups_total",
        "Accounts created through signup"
    ).unwrap();

    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "api_logins_total",
        "Login attempts by outcome",
        &["status"]
    ).unwrap();

    pub static ref PASSWORD_RESETS_COUNTER: CounterVec = register_counter_vec!(
        "api_password_resets_total",
        "Password reset requests and completions",
        &["stage"]
    ).unwrap();

    pub static ref REVIEWS_COUNTER: CounterVec = register_counter_vec!(
        "api_reviews_total",
        "Review writes by action",
        &["action"]
    ).unwrap();

    pub static ref IMAGE_UPLOADS_COUNTER: CounterVec = register_counter_vec!(
        "api_image_uploads_total",
        "Images resized and stored, by owner kind",
        &["kind"]
    ).unwrap();
}
