#[cfg(test)]
mod tests {
    use crate::backend::{decode_all, encode};
    use crate::codec::{get_string, get_var_uint, put_string, put_var_uint, WireReader, MAX_LOGIN_FIELD_BYTES};
    use crate::column::ColumnDescriptor;
    use crate::error::WireError;
    use crate::frontend::{encode_credentials, encode_query, read_credentials, read_handshake, read_query_request};
    use crate::messages::{
        BackendMessage, Command, ConnectionCredentials, ErrorCode, Handshake, OutputParameter,
        QueryRequest, ResponseType, ServerMessage,
    };
    use crate::response::Response;
    use crate::row::{write_row, write_table_header};
    use obridge_core::{
        BoundParameter, ColumnMeta, Driver, FieldValue, Fixture, MemoryDriver, NativeType,
        ParameterDirection, TypeTag,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn var_uint_roundtrips_within_five_bytes() {
        for value in [0u32, 1, 127, 128, 300, 16_383, 16_384, 2_097_151, u32::MAX] {
            let mut buf = Vec::new();
            put_var_uint(&mut buf, value);
            assert!(buf.len() <= 5);
            assert_eq!(get_var_uint(&mut &buf[..]).expect("decode"), value);
        }
        let six = [0x80u8, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert!(matches!(get_var_uint(&mut &six[..]), Err(WireError::VarIntTooLong)));
    }

    #[test]
    fn empty_string_is_one_zero_byte() {
        let mut buf = Vec::new();
        put_string(&mut buf, "");
        assert_eq!(buf, vec![0]);
        assert_eq!(get_string(&mut &buf[..], 0).expect("decode"), "");
    }

    #[tokio::test]
    async fn oversized_login_field_is_rejected() {
        let (mut client, server) = tokio::io::duplex(4096);
        let mut payload = vec![2u8];
        put_string(&mut payload, &"s".repeat(MAX_LOGIN_FIELD_BYTES + 1));
        client.write_all(&payload).await.expect("write");
        let reader = WireReader::new(server);
        let err = read_credentials(&reader).await.expect_err("too large");
        assert!(matches!(
            err,
            WireError::StringTooLarge {
                length: 1025,
                max: 1024
            }
        ));
    }

    #[tokio::test]
    async fn handshake_and_credentials_from_stream() {
        let (mut client, server) = tokio::io::duplex(256);
        let creds = ConnectionCredentials::External {
            connection_string: "Data Source=db;User Id=scott".into(),
        };
        client
            .write_all(&Handshake { compression_requested: false }.encode())
            .await
            .expect("write");
        client.write_all(&encode_credentials(&creds)).await.expect("write");

        let reader = WireReader::new(server);
        let hs = read_handshake(&reader).await.expect("handshake");
        assert!(!hs.compression_requested);
        assert_eq!(read_credentials(&reader).await.expect("credentials"), creds);
    }

    #[tokio::test]
    async fn unknown_credentials_type_is_a_protocol_error() {
        let (mut client, server) = tokio::io::duplex(16);
        client.write_all(&[7]).await.expect("write");
        let reader = WireReader::new(server);
        assert!(matches!(
            read_credentials(&reader).await,
            Err(WireError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn parameterized_query_survives_the_wire() {
        let request = QueryRequest {
            sql: "BEGIN :total := add_tax(:amount, :stamp); END;".into(),
            parameters: vec![
                BoundParameter {
                    name: "amount".into(),
                    type_tag: TypeTag::Number,
                    direction: ParameterDirection::Input,
                    precision: 0,
                    value: FieldValue::Number("19.99".into()),
                },
                BoundParameter {
                    name: "stamp".into(),
                    type_tag: TypeTag::Binary,
                    direction: ParameterDirection::InputOutput,
                    precision: 0,
                    value: FieldValue::Binary(vec![1, 2, 3]),
                },
                BoundParameter {
                    name: "total".into(),
                    type_tag: TypeTag::Number,
                    direction: ParameterDirection::ReturnValue,
                    precision: 0,
                    value: FieldValue::Null,
                },
            ],
        };
        let bytes = encode_query(&request).expect("encode");
        assert_eq!(bytes[0], Command::SubmitParameterizedQuery.wire_byte());

        let (mut client, server) = tokio::io::duplex(1024);
        client.write_all(&bytes[1..]).await.expect("write");
        let reader = WireReader::new(server);
        let decoded = read_query_request(&reader, Command::SubmitParameterizedQuery)
            .await
            .expect("read");
        assert_eq!(decoded, request);
    }

    #[tokio::test]
    async fn plain_submit_carries_only_sql() {
        let bytes = encode_query(&QueryRequest::new("SELECT 1 FROM dual")).expect("encode");
        assert_eq!(bytes[0], 0x20);
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(&bytes[1..]).await.expect("write");
        let reader = WireReader::new(server);
        let decoded = read_query_request(&reader, Command::SubmitQuery).await.expect("read");
        assert_eq!(decoded.sql, "SELECT 1 FROM dual");
        assert!(decoded.parameters.is_empty());
    }

    #[tokio::test]
    async fn nullable_mask_marks_only_present_values() {
        let fixture = Fixture::new("SELECT a, b, c, d FROM t")
            .columns(vec![
                ColumnMeta::new(0, "A", NativeType::Number).nullable(true),
                ColumnMeta::new(1, "B", NativeType::Number).nullable(true),
                ColumnMeta::new(2, "ID", NativeType::Char).nullable(false),
                ColumnMeta::new(3, "C", NativeType::Number).nullable(true),
            ])
            .row(vec![
                FieldValue::Null,
                FieldValue::Integer(5),
                FieldValue::String("k".into()),
                FieldValue::Null,
            ]);
        let driver = MemoryDriver::from_fixtures([fixture]).expect("driver");
        let mut conn = driver.open("db").await.expect("open");
        let mut cursor = conn.execute("SELECT a, b, c, d FROM t", &[]).await.expect("execute");
        let columns: Vec<_> = cursor
            .columns()
            .iter()
            .cloned()
            .map(ColumnDescriptor::new)
            .collect();

        let mut wire = Vec::new();
        let mut header = Response::new(ResponseType::TableHeader);
        write_table_header(&columns, header.payload_mut());
        wire.extend_from_slice(header.as_bytes());

        assert!(cursor.next_row().await.expect("row"));
        let mut row = Response::new(ResponseType::RowDataBatch);
        write_row(&columns, cursor.as_ref(), row.payload_mut()).expect("row");
        // tag, mask, 5, "k"
        assert_eq!(row.as_bytes(), &[0x02, 0b010, 0x85, 1, b'k']);
        wire.extend_from_slice(row.as_bytes());

        let messages = decode_all(&mut &wire[..]).expect("decode");
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[1],
            ServerMessage::Row(vec![
                FieldValue::Null,
                FieldValue::Number("5".into()),
                FieldValue::String("k".into()),
                FieldValue::Null,
            ])
        );
    }

    #[tokio::test]
    async fn null_in_non_nullable_column_is_a_conversion_error() {
        let fixture = Fixture::new("SELECT id FROM t")
            .columns(vec![ColumnMeta::new(0, "ID", NativeType::Number).nullable(false)])
            .row(vec![FieldValue::Null]);
        let driver = MemoryDriver::from_fixtures([fixture]).expect("driver");
        let mut conn = driver.open("db").await.expect("open");
        let mut cursor = conn.execute("SELECT id FROM t", &[]).await.expect("execute");
        let columns: Vec<_> = cursor.columns().iter().cloned().map(ColumnDescriptor::new).collect();
        assert!(cursor.next_row().await.expect("row"));
        let mut out = Vec::new();
        let err = write_row(&columns, cursor.as_ref(), &mut out).expect_err("null");
        assert!(err.to_string().contains("null"));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn end_of_stream_carries_output_parameters() {
        let msg = BackendMessage::EndOfRowStream {
            records_affected: 3,
            output: vec![
                OutputParameter {
                    name: "total".into(),
                    type_tag: TypeTag::Number,
                    direction: ParameterDirection::ReturnValue,
                    precision: 0,
                    value: FieldValue::Number("21.5".into()),
                },
                OutputParameter {
                    name: "note".into(),
                    type_tag: TypeTag::String,
                    direction: ParameterDirection::Output,
                    precision: 0,
                    value: FieldValue::Null,
                },
            ],
        };
        let (mut client, mut server) = tokio::io::duplex(256);
        encode(&msg)
            .expect("encode")
            .send(&mut server)
            .await
            .expect("write");
        drop(server);
        let mut bytes = Vec::new();
        client.read_to_end(&mut bytes).await.expect("read");
        assert_eq!(&bytes[..3], &[0x03, 3, 2]);

        let messages = decode_all(&mut &bytes[..]).expect("decode");
        let ServerMessage::EndOfRowStream {
            records_affected,
            output,
        } = &messages[0]
        else {
            panic!("unexpected message {:?}", messages[0]);
        };
        assert_eq!(*records_affected, 3);
        assert_eq!(output[0].value, FieldValue::Number("21.5".into()));
        assert_eq!(output[1].value, FieldValue::Null);
    }

    #[test]
    fn error_and_success_layouts() {
        let success = encode(&BackendMessage::ConnectionSuccess { compression: true }).expect("encode");
        assert_eq!(success.as_bytes(), &[0x00, 1, 1]);

        let error = encode(&BackendMessage::error(ErrorCode::ConnectionFailed, "ORA-1")).expect("encode");
        assert_eq!(error.as_bytes(), &[0x10, 0x02, 5, b'O', b'R', b'A', b'-', b'1']);

        let oracle = encode(&BackendMessage::OracleQueryError {
            message: "ORA-00942".into(),
        })
        .expect("encode");
        assert_eq!(oracle.as_bytes()[0], 0x11);
        let decoded = decode_all(&mut oracle.as_bytes()).expect("decode");
        assert_eq!(
            decoded,
            vec![ServerMessage::OracleQueryError {
                message: "ORA-00942".into()
            }]
        );
    }
}
