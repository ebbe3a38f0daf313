mod tlv;
