pub mod upload_session;
