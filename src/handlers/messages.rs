//! Direct and room message handlers (spec §4.4, §4.5, §4.6). Each function validates the payload just enough to
//! call into [`crate::services::LifecycleService`] / [`crate::services::RoomService`], then drives the reply and
//! any fan-out through the dispatcher itself — handlers are the only place that knows which outbound frames a
//! given inbound frame produces.

//local shortcuts
use crate::error::{ErrorCode, ServiceError, ServiceResult};
use crate::ids::MessageId;
use crate::model::{Message, MessageState, MessageType};
use crate::protocol::{
    DeliveryStatusValue, MessageConfirmPayload, MessageDeletePayload, MessageEditPayload, MessageReplayPayload,
    MutationKind, OutboundFrame,
};
use crate::state::AppState;
use crate::stores::SocketHandle;

//third-party shortcuts

//standard shortcuts

//-------------------------------------------------------------------------------------------------------------------

fn message_to_frame(message: &Message) -> OutboundFrame
{
    if message.message_type == MessageType::Direct
    {
        OutboundFrame::MessageReceive{
            message_id: message.message_id.clone(),
            sender_id: message.sender_id.clone(),
            content: message.content.clone(),
            timestamp: message.timestamp,
        }
    }
    else
    {
        let room_message_id = message.room_message_id.clone().unwrap_or_default();
        OutboundFrame::RoomMessage{
            room_id: message.room_id.clone().unwrap_or_default(),
            room_message_id: room_message_id.clone(),
            message_id: room_message_id,
            sender_id: message.sender_id.clone(),
            content: message.content.clone(),
            timestamp: message.timestamp,
        }
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// MESSAGE_SEND (spec §4.5). Persists via the lifecycle service, ACKs the sender unconditionally, then attempts
/// immediate delivery; an offline recipient gets a `DELIVERY_STATUS` instead, an online-but-unreachable one
/// (outbound queue exhausted) drives the message straight to `FAILED_BACKPRESSURE`.
pub async fn handle_message_send(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    payload: crate::protocol::MessageSendPayload,
) -> ServiceResult<()>
{
    let ack = state
        .services
        .lifecycle
        .send_direct_message(socket.context.user_id.clone(), payload.recipient_id.clone(), payload.content.clone(), payload.client_message_id.clone())
        .await?;

    state.dispatcher.send_to_socket(
        socket,
        OutboundFrame::MessageAck{
            message_id: ack.message_id.clone(),
            client_message_id: ack.client_message_id.clone(),
            state: ack.state,
            timestamp: ack.timestamp,
            duplicate: ack.duplicate,
        },
        correlation_id,
    );

    if ack.duplicate
    {
        return Ok(());
    }

    let receive_frame = OutboundFrame::MessageReceive{
        message_id: ack.message_id.clone(),
        sender_id: socket.context.user_id.clone(),
        content: payload.content,
        timestamp: ack.timestamp,
    };

    let recipient_online = state.stores.connections.is_user_online(&payload.recipient_id);
    let delivered = state.dispatcher.send_to_user(&payload.recipient_id, receive_frame, None);

    if delivered > 0
    {
        let confirm = state.services.lifecycle.confirm(&payload.recipient_id, &ack.message_id, MessageState::Delivered).await?;
        if !confirm.already_in_state
        {
            state.dispatcher.send_to_socket(
                socket,
                OutboundFrame::MessageStateUpdate{ message_id: ack.message_id, state: MessageState::Delivered },
                None,
            );
        }
    }
    else if recipient_online
    {
        state.services.lifecycle.mark_failed_backpressure(&ack.message_id).await;
        state.dispatcher.send_to_socket(
            socket,
            OutboundFrame::MessageError{
                code: ErrorCode::RecipientBufferFull,
                message: "recipient's outbound queue is full".to_string(),
                retry_after_ms: None,
            },
            None,
        );
    }
    else
    {
        state.dispatcher.send_to_socket(
            socket,
            OutboundFrame::DeliveryStatus{ message_id: ack.message_id, status: DeliveryStatusValue::RecipientOffline },
            None,
        );
    }

    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------

/// Shared handler for MESSAGE_READ, MESSAGE_READ_CONFIRM, and MESSAGE_DELIVERED_CONFIRM (spec §9 open question:
/// the first two are the same operation under two historical names). Dispatches to the direct or room
/// confirmation path depending on the persisted message's type.
pub async fn handle_confirm(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    payload: MessageConfirmPayload,
    target: MessageState,
) -> ServiceResult<()>
{
    let message = state
        .db
        .find_message(&payload.message_id)
        .await
        .map_err(|e| ServiceError::new(ErrorCode::InternalError, e.to_string()))?
        .ok_or_else(|| ServiceError::new(ErrorCode::MessageNotFound, "message does not exist"))?;

    let outcome = if message.message_type == MessageType::Room
    {
        let (outcome, update) = state
            .services
            .rooms
            .confirm_room_delivery(&state.services.lifecycle, &socket.context.user_id, &payload.message_id, target)
            .await?;
        if let Some(update) = update
        {
            if update.complete
            {
                state.dispatcher.send_to_user(
                    &message.sender_id,
                    OutboundFrame::RoomDeliveryUpdate{
                        room_message_id: payload.message_id.clone(),
                        delivered: update.delivered,
                        total: update.total,
                        complete: update.complete,
                    },
                    None,
                );
            }
        }
        outcome
    }
    else
    {
        state.services.lifecycle.confirm_direct(&socket.context.user_id, &payload.message_id, target).await?
    };

    if !outcome.already_in_state
    {
        match target
        {
            MessageState::Delivered =>
            {
                state.dispatcher.send_to_user(
                    &outcome.message.sender_id,
                    OutboundFrame::MessageStateUpdate{ message_id: outcome.message.message_id.clone(), state: MessageState::Delivered },
                    None,
                );
            }
            MessageState::Read =>
            {
                state.dispatcher.send_to_user(
                    &outcome.message.sender_id,
                    OutboundFrame::MessageRead{ message_id: outcome.message.message_id.clone(), reader_id: socket.context.user_id.clone() },
                    None,
                );
            }
            _ => {}
        }
    }

    // No direct reply beyond the fan-out above; the correlation id is still consumed so a future ACK variant can
    // reuse this handler without a signature change.
    let _ = correlation_id;
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------

fn notify_mutation(state: &AppState, message: &Message, kind: MutationKind, content: Option<String>)
{
    let frame = OutboundFrame::MessageMutation{ message_id: message.message_id.clone(), kind, content };
    if let Some(recipient) = &message.recipient_id
    {
        state.dispatcher.send_to_user(recipient, frame, None);
    }
    else if let Some(room_id) = &message.room_id
    {
        if let Some(room) = state.stores.rooms.get(room_id)
        {
            let recipients: Vec<_> = room.recipients_excluding(&message.sender_id).into_iter().collect();
            state.dispatcher.broadcast_to_users(&recipients, frame);
        }
    }
}

//-------------------------------------------------------------------------------------------------------------------

pub async fn handle_message_edit(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    payload: MessageEditPayload,
) -> ServiceResult<()>
{
    let message = state.services.lifecycle.edit_message(&socket.context.user_id, &payload.message_id, payload.content).await?;
    notify_mutation(state, &message, MutationKind::Edit, Some(message.content.clone()));
    state.dispatcher.send_to_socket(
        socket,
        OutboundFrame::MessageMutationAck{ message_id: message.message_id, kind: MutationKind::Edit },
        correlation_id,
    );
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------

pub async fn handle_message_delete(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    payload: MessageDeletePayload,
) -> ServiceResult<()>
{
    let message = state.services.lifecycle.delete_message(&socket.context.user_id, &payload.message_id).await?;
    notify_mutation(state, &message, MutationKind::Delete, None);
    state.dispatcher.send_to_socket(
        socket,
        OutboundFrame::MessageMutationAck{ message_id: message.message_id, kind: MutationKind::Delete },
        correlation_id,
    );
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------

pub async fn handle_message_replay(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    payload: MessageReplayPayload,
) -> ServiceResult<()>
{
    replay_and_send(state, socket, correlation_id, payload.last_message_id, payload.limit).await
}

/// Shared by MESSAGE_REPLAY and RESUME (spec §4.7, §6): runs the replay engine, ships the page as one
/// `MESSAGE_REPLAY_COMPLETE`, then notifies senders and completed room aggregates that were touched along the way.
pub async fn replay_and_send(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    last_message_id: Option<MessageId>,
    limit: Option<usize>,
) -> ServiceResult<()>
{
    let outcome = state.services.replay.replay(&socket.context.user_id, last_message_id, limit).await?;

    let frames = outcome.messages.iter().map(message_to_frame).collect();
    state.dispatcher.send_to_socket(
        socket,
        OutboundFrame::MessageReplayComplete{
            messages: frames,
            message_count: outcome.messages.len(),
            last_message_id: outcome.last_message_id,
            requested_after: outcome.requested_after,
        },
        correlation_id,
    );

    for (sender_id, message_id) in &outcome.sender_notifications
    {
        state.dispatcher.send_to_user(
            sender_id,
            OutboundFrame::MessageStateUpdate{ message_id: message_id.clone(), state: MessageState::Delivered },
            None,
        );
    }

    for (sender_id, room_message_id, delivered, total) in &outcome.room_completions
    {
        state.dispatcher.send_to_user(
            sender_id,
            OutboundFrame::RoomDeliveryUpdate{ room_message_id: room_message_id.clone(), delivered: *delivered, total: *total, complete: true },
            None,
        );
    }

    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------
