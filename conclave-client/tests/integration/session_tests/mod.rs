mod test_peer_events;
