mod test_engine_unavailable;
mod test_error_replies;
