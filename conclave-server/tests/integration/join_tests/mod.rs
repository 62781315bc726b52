mod test_join_notifications;
