//! Transfer and signed-trade handlers: plain transfers, freeze/unfreeze and
//! platform-proxied transfers keyed by one-shot approval signatures.

use ierc_protocol::Approval;
use ierc_types::{
    commands::{
        FreezeRecord, FreezeSellCommand, ProxyTransferCommand, ProxyTransferRecord,
        TransferCommand, TransferRecord, UnfreezeRecord, UnfreezeSellCommand
    },
    events::TransferredData,
    protocol::service_fee,
    CommandBase, Decimal, ErrCode, Event, Operate, ProtocolError
};
use num_traits::Zero;

use super::{to_wei, BlockAggregate};

impl BlockAggregate {
    /// Transfer records are independent: one failing record does not stop
    /// the others. The transaction outcome mirrors the first failure.
    pub(super) fn handle_transfer(&mut self, cmd: &TransferCommand) -> Result<(), ProtocolError> {
        let hash_check = self.check_tx_hash(&cmd.base.tx_hash);
        let mut first_err: Option<ProtocolError> = None;

        for (position, record) in cmd.records.iter().enumerate() {
            let result = match &hash_check {
                Err(err) => Err(err.clone()),
                Ok(()) => self.apply_transfer_record(&cmd.base, record)
            };

            let mut event =
                Event::Transferred(self.envelope(&cmd.base, position as i32, TransferredData {
                    protocol:     cmd.base.protocol,
                    operate:      cmd.base.operate,
                    tick:         record.tick.clone(),
                    from:         record.from.clone(),
                    to:           record.recv.clone(),
                    amount:       record.amount.clone(),
                    eth_value:    Decimal::zero(),
                    gas_price:    cmd.base.gas_price.clone(),
                    nonce:        String::new(),
                    signer_nonce: String::new(),
                    sign:         String::new()
                }));

            if let Err(err) = &result {
                event.set_error(err);
                first_err.get_or_insert_with(|| err.clone());
            }

            self.events.push(event);
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(())
        }
    }

    fn apply_transfer_record(
        &mut self,
        base: &CommandBase,
        record: &TransferRecord
    ) -> Result<(), ProtocolError> {
        if record.amount <= Decimal::zero() {
            return Err(ProtocolError::new(ErrCode::InvalidProtocolParams, "invalid amount"));
        }

        if !self.ticks.contains_key(&record.tick) {
            return Err(ProtocolError::new(ErrCode::TickNotExist, "tick not exist"));
        }

        let sender = self.balance_mut(&record.from, &record.tick);
        if sender.available < record.amount {
            return Err(ProtocolError::new(
                ErrCode::InsufficientAvailableFunds,
                "insufficient available funds"
            ));
        }

        sender.sub_available(base.block_number, &record.amount);
        self.balance_mut(&record.recv, &record.tick)
            .add_available(base.block_number, &record.amount);

        Ok(())
    }

    pub(super) fn handle_freeze_sell(&mut self, cmd: &FreezeSellCommand) -> Result<(), ProtocolError> {
        let hash_check = self.check_tx_hash(&cmd.base.tx_hash);
        let mut first_err: Option<ProtocolError> = None;

        // the buyer's single ETH payment must cover every record
        let mut remaining_value = cmd.base.tx_value.clone();

        for (position, record) in cmd.records.iter().enumerate() {
            let result = match &hash_check {
                Err(err) => Err(err.clone()),
                Ok(()) => self.apply_freeze_record(&cmd.base, record, &mut remaining_value)
            };

            let mut envelope = self.envelope(&cmd.base, position as i32, TransferredData {
                protocol:     cmd.base.protocol,
                operate:      cmd.base.operate,
                tick:         record.tick.clone(),
                from:         record.seller.clone(),
                to:           record.platform.clone(),
                amount:       record.amount.clone(),
                eth_value:    record.value.clone(),
                gas_price:    record.gas_price.clone(),
                nonce:        String::new(),
                signer_nonce: record.sign_nonce.clone(),
                sign:         record.seller_sign.clone()
            });

            match &result {
                Err(err) => {
                    envelope.set_error(err);
                    first_err.get_or_insert_with(|| err.clone());
                }
                Ok(()) => {
                    // the signature is now frozen; remember the event that froze it
                    self.signatures
                        .insert(record.seller_sign.clone(), envelope.clone());
                }
            }

            self.events.push(Event::Transferred(envelope));
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(())
        }
    }

    fn apply_freeze_record(
        &mut self,
        base: &CommandBase,
        record: &FreezeRecord,
        remaining_value: &mut Decimal
    ) -> Result<(), ProtocolError> {
        if record.amount <= Decimal::zero() || record.value < Decimal::zero() {
            return Err(ProtocolError::new(ErrCode::InvalidProtocolParams, "invalid amount"));
        }

        Approval::new(
            &record.tick,
            &record.seller,
            &record.platform,
            record.amount.to_string(),
            record.value.to_string(),
            &record.sign_nonce
        )
        .verify(&record.seller_sign)?;

        if self.signatures.contains_key(&record.seller_sign) {
            return Err(ProtocolError::new(
                ErrCode::SignatureAlreadyUsed,
                "signature already used"
            ));
        }

        let mut required = &record.amount * &record.value;
        if self.fee_start_block != 0 && base.block_number >= self.fee_start_block {
            required = required * service_fee();
        }

        let required_wei = to_wei(&required);
        if *remaining_value < required_wei {
            return Err(ProtocolError::new(ErrCode::InsufficientValue, "insufficient value"));
        }

        if !self.ticks.contains_key(&record.tick) {
            return Err(ProtocolError::new(ErrCode::TickNotExist, "tick not exist"));
        }

        let seller = self.balance_mut(&record.seller, &record.tick);
        if seller.available < record.amount {
            return Err(ProtocolError::new(
                ErrCode::InsufficientAvailableFunds,
                "insufficient available funds"
            ));
        }

        seller.freeze_balance(base.block_number, &record.amount);
        *remaining_value = &*remaining_value - &required_wei;

        Ok(())
    }

    pub(super) fn handle_unfreeze_sell(
        &mut self,
        cmd: &UnfreezeSellCommand
    ) -> Result<(), ProtocolError> {
        let mut first_err: Option<ProtocolError> = None;

        for (position, record) in cmd.records.iter().enumerate() {
            let result = self.apply_unfreeze_record(&cmd.base, record);

            let (data, err) = match result {
                Ok(data) => (data, None),
                Err(err) => (
                    TransferredData {
                        protocol:     cmd.base.protocol,
                        operate:      cmd.base.operate,
                        tick:         String::new(),
                        from:         cmd.base.from.clone(),
                        to:           String::new(),
                        amount:       Decimal::zero(),
                        eth_value:    Decimal::zero(),
                        gas_price:    cmd.base.gas_price.clone(),
                        nonce:        String::new(),
                        signer_nonce: String::new(),
                        sign:         record.sign.clone()
                    },
                    Some(err)
                )
            };

            let mut envelope = self.envelope(&cmd.base, position as i32, data);
            match &err {
                Some(err) => {
                    envelope.set_error(err);
                    first_err.get_or_insert_with(|| err.clone());
                }
                None => {
                    // terminal state: the signature can never be used again
                    self.signatures.insert(record.sign.clone(), envelope.clone());
                }
            }

            self.events.push(Event::Transferred(envelope));
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(())
        }
    }

    fn apply_unfreeze_record(
        &mut self,
        base: &CommandBase,
        record: &UnfreezeRecord
    ) -> Result<TransferredData, ProtocolError> {
        let prior = self
            .signatures
            .get(&record.sign)
            .ok_or_else(|| ProtocolError::new(ErrCode::SignatureNotExist, "signature not exist"))?;

        if prior.data.operate != Operate::FreezeSell {
            return Err(ProtocolError::new(
                ErrCode::SignatureAlreadyUsed,
                "signature already used"
            ));
        }

        // only the platform that took the freeze may undo it
        if prior.data.to != base.from {
            return Err(ProtocolError::new(
                ErrCode::InvalidProtocolParams,
                "invalid unfreeze address"
            ));
        }

        let seller = prior.data.from.clone();
        let tick = prior.data.tick.clone();
        let amount = prior.data.amount.clone();
        let eth_value = prior.data.eth_value.clone();
        let signer_nonce = prior.data.signer_nonce.clone();

        let balance = self.balance_mut(&seller, &tick);
        if balance.freeze < amount {
            return Err(ProtocolError::new(
                ErrCode::InsufficientFreezeFunds,
                "insufficient freeze funds"
            ));
        }

        balance.unfreeze_balance(base.block_number, &amount);

        Ok(TransferredData {
            protocol: base.protocol,
            operate: base.operate,
            tick,
            from: base.from.clone(),
            to: seller,
            amount,
            eth_value,
            gas_price: base.gas_price.clone(),
            nonce: String::new(),
            signer_nonce,
            sign: record.sign.clone()
        })
    }

    pub(super) fn handle_proxy_transfer(
        &mut self,
        cmd: &ProxyTransferCommand
    ) -> Result<(), ProtocolError> {
        let hash_check = self.check_tx_hash(&cmd.base.tx_hash);
        let mut first_err: Option<ProtocolError> = None;
        let mut remaining_value = cmd.base.tx_value.clone();

        for (position, record) in cmd.records.iter().enumerate() {
            let result = match &hash_check {
                Err(err) => Err(err.clone()),
                Ok(()) => self.apply_proxy_record(&cmd.base, record, &mut remaining_value)
            };

            let mut envelope = self.envelope(&cmd.base, position as i32, TransferredData {
                protocol:     cmd.base.protocol,
                operate:      cmd.base.operate,
                tick:         record.tick.clone(),
                from:         record.from.clone(),
                to:           record.to.clone(),
                amount:       record.amount.clone(),
                eth_value:    record.value.clone(),
                gas_price:    cmd.base.gas_price.clone(),
                nonce:        String::new(),
                signer_nonce: record.signer_nonce.clone(),
                sign:         record.sign.clone()
            });

            match &result {
                Err(err) => {
                    envelope.set_error(err);
                    first_err.get_or_insert_with(|| err.clone());
                }
                Ok(()) => {
                    // terminal state: the trade is final
                    self.signatures.insert(record.sign.clone(), envelope.clone());
                }
            }

            self.events.push(Event::Transferred(envelope));
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(())
        }
    }

    fn apply_proxy_record(
        &mut self,
        base: &CommandBase,
        record: &ProxyTransferRecord,
        remaining_value: &mut Decimal
    ) -> Result<(), ProtocolError> {
        if record.amount <= Decimal::zero() || record.value < Decimal::zero() {
            return Err(ProtocolError::new(ErrCode::InvalidProtocolParams, "invalid amount"));
        }

        let prior = self
            .signatures
            .get(&record.sign)
            .ok_or_else(|| ProtocolError::new(ErrCode::SignatureNotExist, "signature not exist"))?;

        if prior.data.operate != Operate::FreezeSell {
            return Err(ProtocolError::new(
                ErrCode::SignatureAlreadyUsed,
                "signature already used"
            ));
        }

        Approval::new(
            &record.tick,
            &record.from,
            &base.from,
            record.amount.to_string(),
            record.value.to_string(),
            &record.signer_nonce
        )
        .verify(&record.sign)?;

        let required_wei = to_wei(&(&record.amount * &record.value));
        if *remaining_value < required_wei {
            return Err(ProtocolError::new(ErrCode::InsufficientValue, "insufficient value"));
        }

        let seller = self.balance_mut(&record.from, &record.tick);
        if seller.freeze < record.amount {
            return Err(ProtocolError::new(
                ErrCode::InsufficientFreezeFunds,
                "insufficient freeze funds"
            ));
        }

        seller.sub_freeze(base.block_number, &record.amount);
        self.balance_mut(&record.to, &record.tick)
            .add_available(base.block_number, &record.amount);

        *remaining_value = &*remaining_value - &required_wei;

        Ok(())
    }
}
