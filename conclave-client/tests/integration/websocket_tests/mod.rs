mod test_ws_closed_connection;
