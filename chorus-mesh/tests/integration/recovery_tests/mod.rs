mod test_failure_retry;
mod test_responder_failure;
